//! Change-log gateway: the only component that talks to the change-log table.
//!
//! Triggers owned by the surrounding metadata system append one row per
//! committed row-level change in the monitored tables. The gateway drains
//! those rows in id order and deletes consumed prefixes once the in-memory
//! handoff succeeded, which is what carries at-least-once across the
//! database boundary: a row is only gone after its event is buffered.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::error::{CdcError, Result};

/// One row of the change-log table, in its wire shape
#[derive(Debug, Clone)]
pub struct ChangeLogRow {
    /// Ordering key (auto-increment primary key)
    pub id:         i64,
    /// When the change occurred, `YYYY-MM-DD HH:MM:SS[.fffffffff]`
    pub timestamp:  String,
    /// Name of the source table
    pub table_name: String,
    /// `INSERT`, `UPDATE` or `DELETE`
    pub operation:  String,
    /// Pre-image JSON; required for DELETE
    pub before:     Option<String>,
    /// Post-image JSON; required for INSERT/UPDATE
    pub after:      Option<String>,
    /// When the trigger fired, same formats as `timestamp`
    pub created_at: String,
}

/// Reader/sweeper for the trigger-populated change-log table
pub struct ChangeLogGateway {
    pool:      SqlitePool,
    log_table: String,
}

impl ChangeLogGateway {
    /// Create a gateway over `pool` reading from `log_table`
    #[must_use]
    pub fn new(pool: SqlitePool, log_table: impl Into<String>) -> Self {
        Self {
            pool,
            log_table: log_table.into(),
        }
    }

    /// The change-log table name this gateway reads
    #[must_use]
    pub fn log_table(&self) -> &str {
        &self.log_table
    }

    /// Create the change-log table if it does not exist.
    ///
    /// The triggers that populate it belong to the embedding metadata
    /// system; only the table itself is bootstrapped here so tests and
    /// fresh embedders have somewhere to write.
    ///
    /// # Errors
    ///
    /// `CaptureTx` if the DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                tablename TEXT NOT NULL,
                operation TEXT NOT NULL,
                before TEXT,
                after TEXT,
                created_at TEXT NOT NULL
            )",
            self.log_table
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| CdcError::CaptureTx {
                reason: format!("ensure change log schema: {e}"),
            })?;
        Ok(())
    }

    /// Fetch the oldest `limit` unprocessed rows, id-ascending.
    ///
    /// # Errors
    ///
    /// `CaptureRead` if the query fails, `CaptureScan` if a row does not
    /// match the wire shape.
    pub async fn fetch_batch(&self, limit: usize) -> Result<Vec<ChangeLogRow>> {
        let sql = format!(
            "SELECT id, timestamp, tablename, operation, before, after, created_at
             FROM {}
             ORDER BY id ASC
             LIMIT ?",
            self.log_table
        );

        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CdcError::CaptureRead {
                reason: format!("fetch change log batch: {e}"),
            })?;

        let batch = rows
            .iter()
            .map(Self::scan_row)
            .collect::<Result<Vec<_>>>()?;

        if !batch.is_empty() {
            debug!(rows = batch.len(), "fetched change log batch");
        }

        Ok(batch)
    }

    /// Delete every row with `id <= max_id` in one transaction.
    ///
    /// The `<=` sweep is intentional: ids are dense enough that rows of
    /// unmonitored tables may sit between monitored ones, and those are
    /// swept with the batch.
    ///
    /// # Errors
    ///
    /// `CaptureTx` if the transaction cannot be opened or committed,
    /// `CaptureDelete` if the statement fails. On failure the transaction
    /// rolls back and the batch counts as still-unprocessed.
    pub async fn delete_up_to(&self, max_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(|e| CdcError::CaptureTx {
            reason: format!("begin change log delete: {e}"),
        })?;

        let sql = format!("DELETE FROM {} WHERE id <= ?", self.log_table);
        let result = sqlx::query(&sql)
            .bind(max_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CdcError::CaptureDelete {
                reason: format!("delete change log rows <= {max_id}: {e}"),
            })?;

        tx.commit().await.map_err(|e| CdcError::CaptureTx {
            reason: format!("commit change log delete: {e}"),
        })?;

        let deleted = result.rows_affected();
        debug!(max_id, deleted, "swept change log rows");
        Ok(deleted)
    }

    fn scan_row(row: &SqliteRow) -> Result<ChangeLogRow> {
        let scan = |e: sqlx::Error| CdcError::CaptureScan {
            reason: format!("scan change log row: {e}"),
        };

        Ok(ChangeLogRow {
            id:         row.try_get("id").map_err(scan)?,
            timestamp:  row.try_get("timestamp").map_err(scan)?,
            table_name: row.try_get("tablename").map_err(scan)?,
            operation:  row.try_get("operation").map_err(scan)?,
            before:     row.try_get("before").map_err(scan)?,
            after:      row.try_get("after").map_err(scan)?,
            created_at: row.try_get("created_at").map_err(scan)?,
        })
    }
}
