//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` takes precedence; otherwise a
//! `TRACE_SPEC` of the form `component=level:component=level` is translated
//! into `EnvFilter` directives.

use crate::constants::DEFAULT_LOG_FILTER;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Translate a `TRACE_SPEC` value into `EnvFilter` directives
///
/// `*` (or an empty component) sets the global level. Unknown levels are
/// dropped.
pub fn trace_spec_to_filter(spec: &str) -> String {
    spec.split([':', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (component, level) = match part.split_once('=') {
                Some((component, level)) => (component.trim(), level.trim()),
                None => ("*", part),
            };
            let level = map_level(level)?;
            if component.is_empty() || component == "*" {
                Some(level.to_string())
            } else {
                Some(format!("{}={}", component.replace(['.', '-'], "_"), level))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn map_level(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "off" | "none" => Some("off"),
        "fatal" | "severe" | "error" => Some("error"),
        "warning" | "warn" => Some("warn"),
        "info" | "audit" => Some("info"),
        "debug" | "fine" | "finer" => Some("debug"),
        "trace" | "finest" | "all" => Some("trace"),
        _ => None,
    }
}

/// Build the filter from the environment
pub fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = std::env::var("TRACE_SPEC")
        .map(|spec| trace_spec_to_filter(&spec))
        .unwrap_or_default();
    if directives.is_empty() {
        EnvFilter::new(DEFAULT_LOG_FILTER)
    } else {
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global fmt subscriber
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}
