#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Tablecast - in-process CDC event bus for embedded catalog metadata
//!
//! Tablecast watches a small set of catalog tables inside an embedded
//! SQLite store and delivers every committed row-level change, as a typed
//! event, to every in-process component subscribed to the originating
//! table. Database, poller, buffer, scheduler and subscribers all live in
//! one process and share one pool.
//!
//! # Architecture
//!
//! ```text
//! Catalog mutation (INSERT/UPDATE/DELETE)
//!     ↓
//! Triggers append to the change-log table (__cdc_log)
//!     ↓
//! ChangeLogGateway fetches id-ordered batches (poll loop)
//!     ↓
//! decode_row turns each row into a typed ChangeEvent
//!     ↓
//! EventStore buffers events per table (sweep deletes consumed log rows)
//!     ↓
//! Scheduler dispatch loop offers each event to every Subscriber
//!     ├─ per-subscriber errors/panics → status = error, delivery continues
//!     └─ event marked processed after the sweep
//!     ↓
//! Reclaim loop compacts processed events on a fixed cadence
//! ```
//!
//! Durability is at-least-once across the database boundary: a change-log
//! row is deleted only after its event is buffered, so rows survive a
//! crash until consumed. Events held only in memory are lost with the
//! process. Delivery order is id-ascending per source table; no ordering
//! is promised across tables.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tablecast::{
//!     CaptureConfig, Registration, Scheduler, SourceTable,
//! };
//!
//! # use tablecast::{ChangeEvent, Result, Subscriber};
//! # struct SchemaCache;
//! # #[async_trait::async_trait]
//! # impl Subscriber for SchemaCache {
//! #     async fn on_event(&self, _event: &ChangeEvent) -> Result<()> { Ok(()) }
//! #     async fn on_health(&self) -> Result<()> { Ok(()) }
//! #     async fn on_refresh(&self) -> Result<()> { Ok(()) }
//! # }
//! # async fn demo(pool: sqlx::SqlitePool) -> Result<()> {
//! let mut scheduler = Scheduler::builder()
//!     .pool(pool)
//!     .config(CaptureConfig::new().with_poll_interval_ms(100))
//!     .build()?;
//!
//! scheduler.register(
//!     Registration::new("schema-cache", "1.0.0")
//!         .subscribe(SourceTable::Tables)
//!         .subscribe(SourceTable::TableMetadata)
//!         .with_instance(Arc::new(SchemaCache)),
//! )?;
//!
//! scheduler.start().await?;
//! // ... the embedding process runs ...
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod gateway;
pub mod records;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export common types at crate level
pub use config::{CaptureConfig, DEFAULT_LOG_TABLE};
pub use decoder::decode_row;
pub use error::{CdcError, CdcErrorCode, Result};
pub use event::{ChangeEvent, ChangeOp, Event, SourceTable};
pub use gateway::{ChangeLogGateway, ChangeLogRow};
pub use records::{TableFileRecord, TableMetadataRecord, TableRecord, TableStatisticsRecord};
pub use registry::{ComponentDescriptor, ComponentStatus, Registration, SubscriberRegistry};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerStats};
pub use store::EventStore;
pub use traits::Subscriber;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_error_codes_surface_at_crate_root() {
        let err = CdcError::CaptureRead {
            reason: "disk gone".to_string(),
        };
        assert!(err.is_transient());
        assert_eq!(err.code(), CdcErrorCode::CaptureRead);
    }

    #[test]
    fn test_monitored_set_is_closed() {
        assert_eq!(SourceTable::ALL.len(), 4);
        assert_eq!(SourceTable::from_name("__cdc_log"), None);
    }

    #[test]
    fn test_default_config_matches_wire_contract() {
        let config = CaptureConfig::default();
        assert_eq!(config.log_table_name, DEFAULT_LOG_TABLE);
        assert_eq!(config.batch_size, 256);
    }
}
