//! Decoding change-log rows into typed events.
//!
//! [`decode_row`] is a pure function from the wire shape to a
//! [`ChangeEvent`], selected by source-table name. It fails closed: unknown
//! tables, missing payloads, unparseable JSON and malformed timestamps are
//! all errors. The poll loop treats every decode error as row-local (the
//! row is logged and dropped, the batch proceeds and the row is swept), so
//! a poison row can never stall the pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::{CdcError, Result};
use crate::event::{ChangeEvent, ChangeOp, Event, SourceTable};
use crate::gateway::ChangeLogRow;
use crate::records::{TableFileRecord, TableMetadataRecord, TableRecord, TableStatisticsRecord};

/// Timestamp format with fractional seconds, tried first
const FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Whole-second fallback format
const FORMAT_WHOLE: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a change-log timestamp in either accepted format
fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, FORMAT_FRACTIONAL)
        .or_else(|_| NaiveDateTime::parse_from_str(value, FORMAT_WHOLE))
        .map(|naive| naive.and_utc())
        .map_err(|_| CdcError::TimestampParse {
            value: value.to_string(),
        })
}

fn decode_payload<T: DeserializeOwned>(row: &ChangeLogRow, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| CdcError::PayloadDecode {
        id:     row.id,
        table:  row.table_name.clone(),
        target: std::any::type_name::<T>(),
        reason: e.to_string(),
    })
}

/// Decode one change-log row into its typed event.
///
/// # Errors
///
/// `TimestampParse` for malformed instants, `UnsupportedEventType` for an
/// operation outside INSERT/UPDATE/DELETE, `UnknownTable` for tables
/// outside the monitored set, `PayloadMissing` when the operation's image
/// is absent or empty, `PayloadDecode` when the JSON does not match the
/// table's row type. All of these are row-local (see
/// [`CdcError::is_row_local`]).
pub fn decode_row(row: &ChangeLogRow) -> Result<ChangeEvent> {
    let timestamp = parse_instant(&row.timestamp)?;
    let created_at = parse_instant(&row.created_at)?;
    let op: ChangeOp = row.operation.parse()?;

    let table = SourceTable::from_name(&row.table_name).ok_or_else(|| CdcError::UnknownTable {
        table: row.table_name.clone(),
    })?;

    // INSERT/UPDATE carry the post-image, DELETE the pre-image.
    let image = match op {
        ChangeOp::Insert | ChangeOp::Update => row.after.as_deref(),
        ChangeOp::Delete => row.before.as_deref(),
    };
    let payload = match image {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(CdcError::PayloadMissing {
                id:    row.id,
                table: row.table_name.clone(),
            })
        },
    };

    let event = match table {
        SourceTable::Tables => ChangeEvent::Table(Event {
            id: row.id,
            table,
            op,
            data: decode_payload::<TableRecord>(row, payload)?,
            timestamp,
            created_at,
        }),
        SourceTable::TableFiles => ChangeEvent::TableFile(Event {
            id: row.id,
            table,
            op,
            data: decode_payload::<TableFileRecord>(row, payload)?,
            timestamp,
            created_at,
        }),
        SourceTable::TableMetadata => ChangeEvent::TableMetadata(Event {
            id: row.id,
            table,
            op,
            data: decode_payload::<TableMetadataRecord>(row, payload)?,
            timestamp,
            created_at,
        }),
        SourceTable::TableStatistics => ChangeEvent::TableStatistics(Event {
            id: row.id,
            table,
            op,
            data: decode_payload::<TableStatisticsRecord>(row, payload)?,
            timestamp,
            created_at,
        }),
    };

    Ok(event)
}
