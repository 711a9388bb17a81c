//! Capture configuration.

use serde::Deserialize;

/// Default change-log table name
pub const DEFAULT_LOG_TABLE: &str = "__cdc_log";

const fn default_batch_size() -> usize {
    256
}

const fn default_poll_interval_ms() -> u64 {
    100
}

fn default_log_table_name() -> String {
    DEFAULT_LOG_TABLE.to_string()
}

const fn default_dispatch_interval_ms() -> u64 {
    50
}

const fn default_dispatch_batch_size() -> usize {
    100
}

const fn default_reclaim_interval_secs() -> u64 {
    300
}

/// Configuration for the capture pipeline.
///
/// All fields have defaults; zero or empty values are replaced by the
/// defaults when the scheduler is built (see [`CaptureConfig::normalized`]).
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Maximum change-log rows fetched per poll (default: 256)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How often the poll loop wakes, in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Name of the change-log table (default: `__cdc_log`)
    #[serde(default = "default_log_table_name")]
    pub log_table_name: String,

    /// How often the dispatch loop wakes, in milliseconds (default: 50)
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Maximum events dispatched per table per tick (default: 100)
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,

    /// How often the buffer is compacted, in seconds (default: 300)
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            batch_size:            default_batch_size(),
            poll_interval_ms:      default_poll_interval_ms(),
            log_table_name:        default_log_table_name(),
            dispatch_interval_ms:  default_dispatch_interval_ms(),
            dispatch_batch_size:   default_dispatch_batch_size(),
            reclaim_interval_secs: default_reclaim_interval_secs(),
        }
    }
}

impl CaptureConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll batch size
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the change-log table name
    #[must_use]
    pub fn with_log_table_name(mut self, name: impl Into<String>) -> Self {
        self.log_table_name = name.into();
        self
    }

    /// Set the dispatch interval
    #[must_use]
    pub const fn with_dispatch_interval_ms(mut self, ms: u64) -> Self {
        self.dispatch_interval_ms = ms;
        self
    }

    /// Set the per-table dispatch batch size
    #[must_use]
    pub const fn with_dispatch_batch_size(mut self, size: usize) -> Self {
        self.dispatch_batch_size = size;
        self
    }

    /// Set the reclaim interval
    #[must_use]
    pub const fn with_reclaim_interval_secs(mut self, secs: u64) -> Self {
        self.reclaim_interval_secs = secs;
        self
    }

    /// Replace out-of-range values with the defaults.
    ///
    /// The contract is ">0, else default": zero intervals and batch sizes
    /// and an empty table name fall back rather than erroring.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = default_batch_size();
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
        }
        if self.log_table_name.is_empty() {
            self.log_table_name = default_log_table_name();
        }
        if self.dispatch_interval_ms == 0 {
            self.dispatch_interval_ms = default_dispatch_interval_ms();
        }
        if self.dispatch_batch_size == 0 {
            self.dispatch_batch_size = default_dispatch_batch_size();
        }
        if self.reclaim_interval_secs == 0 {
            self.reclaim_interval_secs = default_reclaim_interval_secs();
        }
        self
    }
}
