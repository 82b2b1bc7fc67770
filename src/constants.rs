//! # Constants
//!
//! Default configuration values and shared identifiers.

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "stack-controller";

/// Default filter when neither `RUST_LOG` nor `TRACE_SPEC` is set
pub const DEFAULT_LOG_FILTER: &str = "stack_controller=info";

/// Default periodic reconcile interval (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default requeue when the backoff state cannot be read (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default archive download timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Archive cache entries unused for this long are purged (12 hours)
pub const DEFAULT_ARCHIVE_CACHE_MAX_AGE_SECS: u64 = 12 * 60 * 60;

/// Archive cache purge tick (30 minutes)
pub const DEFAULT_ARCHIVE_CACHE_PURGE_INTERVAL_SECS: u64 = 30 * 60;

/// Default metrics/probes port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before restarting the watch after an unexpected stream error (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;
