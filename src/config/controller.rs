//! # Reconcile and Fetch Settings

use super::{env_var_opt, env_var_or_default};
use crate::constants::*;

/// Controller configuration
#[derive(Clone)]
pub struct ControllerConfig {
    /// Periodic requeue after a successful reconcile (seconds)
    pub reconcile_interval_secs: u64,
    /// Archive download timeout (seconds)
    pub http_timeout_secs: u64,
    /// Cached archives unused for longer than this are dropped (seconds)
    pub cache_max_age_secs: u64,
    /// How often the archive cache is purged (seconds)
    pub cache_purge_interval_secs: u64,
    /// Token sent to the GitHub API for release lookups
    pub github_token: Option<String>,
    /// Restrict the watch to one namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("reconcile_interval_secs", &self.reconcile_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("cache_max_age_secs", &self.cache_max_age_secs)
            .field("cache_purge_interval_secs", &self.cache_purge_interval_secs)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("watch_namespace", &self.watch_namespace)
            .finish()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            cache_max_age_secs: DEFAULT_ARCHIVE_CACHE_MAX_AGE_SECS,
            cache_purge_interval_secs: DEFAULT_ARCHIVE_CACHE_PURGE_INTERVAL_SECS,
            github_token: None,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            reconcile_interval_secs: env_var_or_default(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            cache_max_age_secs: env_var_or_default(
                "ARCHIVE_CACHE_MAX_AGE_SECS",
                DEFAULT_ARCHIVE_CACHE_MAX_AGE_SECS,
            ),
            cache_purge_interval_secs: env_var_or_default(
                "ARCHIVE_CACHE_PURGE_INTERVAL_SECS",
                DEFAULT_ARCHIVE_CACHE_PURGE_INTERVAL_SECS,
            ),
            github_token: env_var_opt("GITHUB_TOKEN"),
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
        }
    }
}
