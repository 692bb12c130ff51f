//! Tracing subscriber setup.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Returns `Ok(false)` if a
/// global subscriber was already installed, so calling twice is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.filter)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match installed {
        Ok(()) => {
            tracing::debug!(json = config.json, "Logging initialized");
            Ok(true)
        }
        // Lost a race with another initializer
        Err(_) if tracing::dispatcher::has_been_set() => Ok(false),
        Err(e) => Err(LoggingError::Install(e.to_string())),
    }
}

fn build_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
        filter: directive.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("careboard_core=debug,rusqlite=warn").is_ok());
        assert!(matches!(
            build_filter("careboard_core=notalevel"),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_init_twice() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        // Second install must not error
        assert!(init_logging(&config).is_ok());
    }
}
