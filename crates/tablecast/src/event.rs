//! Event types for the CDC bus.
//!
//! Every committed row-level change in a monitored catalog table becomes one
//! [`ChangeEvent`]: a tagged variant carrying the decoded row for that table
//! together with the change-log id, operation and instants. Operations that
//! must be generic over variants (store, list, mark) key on `id()` and
//! `table()`, which are common to all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CdcError;
use crate::records::{TableFileRecord, TableMetadataRecord, TableRecord, TableStatisticsRecord};

/// The type of row-level change that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    /// Row was inserted
    Insert,
    /// Row was updated
    Update,
    /// Row was deleted
    Delete,
}

impl ChangeOp {
    /// Convert to the wire string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeOp::Insert => "INSERT",
            ChangeOp::Update => "UPDATE",
            ChangeOp::Delete => "DELETE",
        }
    }
}

impl FromStr for ChangeOp {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(ChangeOp::Insert),
            "UPDATE" => Ok(ChangeOp::Update),
            "DELETE" => Ok(ChangeOp::Delete),
            other => Err(CdcError::UnsupportedEventType {
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored source table.
///
/// The set is closed at compile time; the decoder rejects change-log rows
/// naming any other table, and the gateway sweeps them with the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    /// The `tables` catalog table
    Tables,
    /// The `table_files` catalog table
    TableFiles,
    /// The `table_metadata` catalog table
    TableMetadata,
    /// The `table_statistics` catalog table
    TableStatistics,
}

impl SourceTable {
    /// Every monitored table, in wire-name order
    pub const ALL: [SourceTable; 4] = [
        SourceTable::Tables,
        SourceTable::TableFiles,
        SourceTable::TableMetadata,
        SourceTable::TableStatistics,
    ];

    /// Convert to the wire table name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceTable::Tables => "tables",
            SourceTable::TableFiles => "table_files",
            SourceTable::TableMetadata => "table_metadata",
            SourceTable::TableStatistics => "table_statistics",
        }
    }

    /// Look up a monitored table by wire name.
    ///
    /// Returns `None` for names outside the monitored set.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tables" => Some(SourceTable::Tables),
            "table_files" => Some(SourceTable::TableFiles),
            "table_metadata" => Some(SourceTable::TableMetadata),
            "table_statistics" => Some(SourceTable::TableStatistics),
            _ => None,
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded change, parametric over the source table's row type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    /// Change-log row id; unique and monotonic per source table
    pub id:         i64,
    /// The source table the change occurred in
    pub table:      SourceTable,
    /// The operation that produced the change
    pub op:         ChangeOp,
    /// The decoded row image (post-image for INSERT/UPDATE, pre-image for DELETE)
    pub data:       T,
    /// When the change occurred
    pub timestamp:  DateTime<Utc>,
    /// When the trigger recorded the change
    pub created_at: DateTime<Utc>,
}

/// A decoded change event, one variant per monitored table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// Change in the `tables` catalog table
    Table(Event<TableRecord>),
    /// Change in the `table_files` catalog table
    TableFile(Event<TableFileRecord>),
    /// Change in the `table_metadata` catalog table
    TableMetadata(Event<TableMetadataRecord>),
    /// Change in the `table_statistics` catalog table
    TableStatistics(Event<TableStatisticsRecord>),
}

impl ChangeEvent {
    /// The change-log row id
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            ChangeEvent::Table(e) => e.id,
            ChangeEvent::TableFile(e) => e.id,
            ChangeEvent::TableMetadata(e) => e.id,
            ChangeEvent::TableStatistics(e) => e.id,
        }
    }

    /// The source table
    #[must_use]
    pub const fn table(&self) -> SourceTable {
        match self {
            ChangeEvent::Table(e) => e.table,
            ChangeEvent::TableFile(e) => e.table,
            ChangeEvent::TableMetadata(e) => e.table,
            ChangeEvent::TableStatistics(e) => e.table,
        }
    }

    /// The operation that produced the change
    #[must_use]
    pub const fn op(&self) -> ChangeOp {
        match self {
            ChangeEvent::Table(e) => e.op,
            ChangeEvent::TableFile(e) => e.op,
            ChangeEvent::TableMetadata(e) => e.op,
            ChangeEvent::TableStatistics(e) => e.op,
        }
    }

    /// When the change occurred
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChangeEvent::Table(e) => e.timestamp,
            ChangeEvent::TableFile(e) => e.timestamp,
            ChangeEvent::TableMetadata(e) => e.timestamp,
            ChangeEvent::TableStatistics(e) => e.timestamp,
        }
    }

    /// When the trigger recorded the change
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            ChangeEvent::Table(e) => e.created_at,
            ChangeEvent::TableFile(e) => e.created_at,
            ChangeEvent::TableMetadata(e) => e.created_at,
            ChangeEvent::TableStatistics(e) => e.created_at,
        }
    }

    /// Check if this event deletes its row
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.op(), ChangeOp::Delete)
    }
}
