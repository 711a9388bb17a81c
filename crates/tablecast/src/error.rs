//! CDC error types and error code definitions.

use thiserror::Error;

/// CDC error type with structured error codes.
#[derive(Debug, Error, Clone)]
pub enum CdcError {
    /// CDC001: Scheduler was built without a database handle
    #[error("CDC001: No database handle provided to the scheduler builder")]
    MissingDatabaseHandle,

    /// CDC002: Change-log query failed
    #[error("CDC002: Change log read failed: {reason}")]
    CaptureRead {
        /// Reason for the read failure
        reason: String,
    },

    /// CDC003: Change-log row could not be scanned into its wire shape
    #[error("CDC003: Change log row scan failed: {reason}")]
    CaptureScan {
        /// Reason for the scan failure
        reason: String,
    },

    /// CDC004: Consumed change-log rows could not be deleted
    #[error("CDC004: Change log delete failed: {reason}")]
    CaptureDelete {
        /// Reason for the delete failure
        reason: String,
    },

    /// CDC005: Change-log transaction could not be opened or committed
    #[error("CDC005: Change log transaction failed: {reason}")]
    CaptureTx {
        /// Reason for the transaction failure
        reason: String,
    },

    /// CDC006: Change-log row names a table outside the monitored set
    #[error("CDC006: Change for unmonitored table '{table}'")]
    UnknownTable {
        /// The table name that is not monitored
        table: String,
    },

    /// CDC007: Change-log row is missing the payload its operation requires
    #[error("CDC007: Change {id} on '{table}' carries no payload for its operation")]
    PayloadMissing {
        /// Change-log row id
        id:    i64,
        /// Source table name
        table: String,
    },

    /// CDC008: Change-log payload did not decode into the table's row type
    #[error("CDC008: Change {id} on '{table}' failed to decode as {target}: {reason}")]
    PayloadDecode {
        /// Change-log row id
        id:     i64,
        /// Source table name
        table:  String,
        /// Target row type name
        target: &'static str,
        /// Reason for the decode failure
        reason: String,
    },

    /// CDC009: Change-log timestamp matched neither accepted format
    #[error("CDC009: Unparseable change timestamp '{value}'")]
    TimestampParse {
        /// The offending timestamp text
        value: String,
    },

    /// CDC010: Input names an event or operation kind the bus does not carry
    #[error("CDC010: Unsupported event type '{kind}'")]
    UnsupportedEventType {
        /// The unsupported kind
        kind: String,
    },

    /// CDC011: Registration with an empty component name
    #[error("CDC011: Component name must not be empty")]
    NameEmpty,

    /// CDC012: Registration with an empty subscription set
    #[error("CDC012: Component '{name}' subscribes to no tables")]
    NoSubscriptions {
        /// The component name
        name: String,
    },

    /// CDC013: Registration without a dispatchable instance
    #[error("CDC013: Component '{name}' was registered without an instance")]
    MissingInstance {
        /// The component name
        name: String,
    },

    /// CDC014: Operation on a component that is not registered
    #[error("CDC014: Unknown component '{name}'")]
    UnknownComponent {
        /// The component name
        name: String,
    },

    /// CDC015: A subscriber reported a delivery failure
    #[error("CDC015: Subscriber '{component}' failed: {reason}")]
    Subscriber {
        /// The failing component name
        component: String,
        /// Reason reported by the subscriber
        reason:    String,
    },
}

/// Error code with classification for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcErrorCode {
    /// CDC001: Missing database handle
    MissingDatabaseHandle,
    /// CDC002: Change-log read failed
    CaptureRead,
    /// CDC003: Change-log row scan failed
    CaptureScan,
    /// CDC004: Change-log delete failed
    CaptureDelete,
    /// CDC005: Change-log transaction failed
    CaptureTx,
    /// CDC006: Unmonitored table
    UnknownTable,
    /// CDC007: Missing payload
    PayloadMissing,
    /// CDC008: Payload decode failed
    PayloadDecode,
    /// CDC009: Timestamp parse failed
    TimestampParse,
    /// CDC010: Unsupported event type
    UnsupportedEventType,
    /// CDC011: Empty component name
    NameEmpty,
    /// CDC012: Empty subscription set
    NoSubscriptions,
    /// CDC013: Missing subscriber instance
    MissingInstance,
    /// CDC014: Unknown component
    UnknownComponent,
    /// CDC015: Subscriber delivery failure
    Subscriber,
}

impl CdcErrorCode {
    /// Returns true if this error is transient (the next tick may succeed)
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            CdcErrorCode::CaptureRead
                | CdcErrorCode::CaptureScan
                | CdcErrorCode::CaptureDelete
                | CdcErrorCode::CaptureTx
                | CdcErrorCode::Subscriber
        )
    }

    /// Returns true if this error poisons a single row rather than the batch
    #[must_use]
    pub const fn is_row_local(self) -> bool {
        matches!(
            self,
            CdcErrorCode::UnknownTable
                | CdcErrorCode::PayloadMissing
                | CdcErrorCode::PayloadDecode
                | CdcErrorCode::TimestampParse
        )
    }
}

impl CdcError {
    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> CdcErrorCode {
        match self {
            CdcError::MissingDatabaseHandle => CdcErrorCode::MissingDatabaseHandle,
            CdcError::CaptureRead { .. } => CdcErrorCode::CaptureRead,
            CdcError::CaptureScan { .. } => CdcErrorCode::CaptureScan,
            CdcError::CaptureDelete { .. } => CdcErrorCode::CaptureDelete,
            CdcError::CaptureTx { .. } => CdcErrorCode::CaptureTx,
            CdcError::UnknownTable { .. } => CdcErrorCode::UnknownTable,
            CdcError::PayloadMissing { .. } => CdcErrorCode::PayloadMissing,
            CdcError::PayloadDecode { .. } => CdcErrorCode::PayloadDecode,
            CdcError::TimestampParse { .. } => CdcErrorCode::TimestampParse,
            CdcError::UnsupportedEventType { .. } => CdcErrorCode::UnsupportedEventType,
            CdcError::NameEmpty => CdcErrorCode::NameEmpty,
            CdcError::NoSubscriptions { .. } => CdcErrorCode::NoSubscriptions,
            CdcError::MissingInstance { .. } => CdcErrorCode::MissingInstance,
            CdcError::UnknownComponent { .. } => CdcErrorCode::UnknownComponent,
            CdcError::Subscriber { .. } => CdcErrorCode::Subscriber,
        }
    }

    /// Returns true if this error is transient (the next tick may succeed)
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code().is_transient()
    }

    /// Returns true if this error poisons a single row rather than the batch
    #[must_use]
    pub const fn is_row_local(&self) -> bool {
        self.code().is_row_local()
    }
}

/// Result type alias for CDC operations
pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_is_transient() {
        assert!(CdcErrorCode::CaptureRead.is_transient());
        assert!(CdcErrorCode::CaptureDelete.is_transient());
        assert!(CdcErrorCode::Subscriber.is_transient());

        assert!(!CdcErrorCode::UnknownTable.is_transient());
        assert!(!CdcErrorCode::NameEmpty.is_transient());
        assert!(!CdcErrorCode::MissingDatabaseHandle.is_transient());
    }

    #[test]
    fn test_error_code_is_row_local() {
        assert!(CdcErrorCode::UnknownTable.is_row_local());
        assert!(CdcErrorCode::PayloadMissing.is_row_local());
        assert!(CdcErrorCode::PayloadDecode.is_row_local());
        assert!(CdcErrorCode::TimestampParse.is_row_local());

        assert!(!CdcErrorCode::CaptureRead.is_row_local());
        assert!(!CdcErrorCode::UnknownComponent.is_row_local());
    }

    #[test]
    fn test_cdc_error_code_method() {
        let err = CdcError::PayloadMissing {
            id:    7,
            table: "tables".to_string(),
        };
        assert_eq!(err.code(), CdcErrorCode::PayloadMissing);
        assert!(!err.is_transient());
        assert!(err.is_row_local());
    }

    #[test]
    fn test_error_messages_carry_codes() {
        let err = CdcError::UnknownTable {
            table: "other".to_string(),
        };
        assert!(err.to_string().starts_with("CDC006"));

        let err = CdcError::Subscriber {
            component: "schema-cache".to_string(),
            reason:    "refresh failed".to_string(),
        };
        assert!(err.to_string().contains("schema-cache"));
    }
}
