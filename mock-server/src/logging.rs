//! Logging setup for the server binary
//!
//! Library code only emits `tracing` events; this module installs a
//! subscriber for processes that want to see them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Overrides the default filter, `RUST_LOG` syntax
pub const LOG_ENV: &str = "ONVIF_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// One compact line per event
    Development,
    /// Every request, with thread ids and source locations
    Debug,
}

impl LoggingMode {
    /// Filter used when neither `ONVIF_LOG_LEVEL` nor `RUST_LOG` is set.
    /// The HTTP stack stays at `warn` so request logging comes from the
    /// dispatcher alone.
    fn default_directives(self) -> &'static str {
        match self {
            LoggingMode::Silent => "off",
            LoggingMode::Development => {
                "info,onvif_server=info,onvif_discovery=info,warp=warn,hyper=warn"
            }
            LoggingMode::Debug => {
                "debug,onvif_server=debug,onvif_api=debug,onvif_soap=debug,warp=warn,hyper=warn"
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install the global subscriber for `mode`. Fails if one is already set.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let filter = env_filter(mode, std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    let registry = Registry::default().with(filter);

    let result = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        LoggingMode::Debug => registry
            .with(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    };
    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// First non-empty of `override_level`, `rust_log` and the mode default
fn env_filter(mode: LoggingMode, override_level: Option<String>, rust_log: Option<String>) -> EnvFilter {
    override_level
        .into_iter()
        .chain(rust_log)
        .find(|directives| !directives.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(mode.default_directives()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn test_filter_precedence() {
        let filter = env_filter(LoggingMode::Development, Some("trace".into()), Some("error".into()));
        assert_eq!(filter.to_string(), "trace");

        let filter = env_filter(LoggingMode::Development, Some("  ".into()), Some("error".into()));
        assert_eq!(filter.to_string(), "error");

        let filter = env_filter(LoggingMode::Debug, None, None);
        assert!(filter.to_string().contains("onvif_server=debug"));
    }
}
