//! Structured logging for conformance runs.
//!
//! Human-readable compact output goes to stderr so stdout stays reserved for
//! the JSON summary. An optional second layer writes JSON lines to a file.
//! `RUST_LOG` overrides the default filter.

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber. `verbose` lowers the default level to
/// `debug`.
///
/// # Errors
///
/// Fails when the JSON log file cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(json_log_path: Option<&Path>, verbose: bool) -> Result<(), String> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let json_layer = match json_log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
            }
            let file = File::create(path)
                .map_err(|err| format!("failed creating {}: {err}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file))
                    .with_target(true)
                    .with_current_span(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(terminal_layer)
        .with(json_layer)
        .try_init()
        .map_err(|err| format!("failed installing log subscriber: {err}"))
}

/// Test-writer logging; safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_test_writer()
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::init_test_logging;

    #[test]
    fn test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!("still usable after repeated init");
    }
}
