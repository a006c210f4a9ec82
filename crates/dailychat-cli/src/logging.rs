//! Tracing bootstrap for the CLI.
//!
//! Precedence:
//! 1) `RUST_LOG`
//! 2) `--log-level`
//! 3) `logging.level` from the config file
//!
//! The subscriber is installed before the config is read so the loader's own
//! lines are not lost; until then it logs at [`BOOTSTRAP_LEVEL`].

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub const BOOTSTRAP_LEVEL: &str = "info";

/// Installed subscriber. Holds on to the filter when the config may still
/// replace it.
pub struct Logging {
    pending: Option<reload::Handle<EnvFilter, Registry>>,
}

pub fn init(cli_level: Option<&str>) -> Logging {
    let (filter, from_config) = bootstrap_filter(std::env::var("RUST_LOG").ok(), cli_level);
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    Logging {
        pending: from_config.then_some(handle),
    }
}

impl Logging {
    /// Switch to the config file's level unless `RUST_LOG` or `--log-level`
    /// already decided.
    pub fn apply_config_level(self, level: &str) {
        let Some(handle) = self.pending else {
            return;
        };
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = handle.reload(filter) {
                    tracing::warn!(error = %e, "Failed to apply configured log level");
                }
            }
            Err(e) => tracing::warn!(level, error = %e, "Invalid configured log level"),
        }
    }
}

/// The filter to start with, and whether the config file may still replace it.
fn bootstrap_filter(rust_log: Option<String>, cli_level: Option<&str>) -> (EnvFilter, bool) {
    if let Some(filter) = rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
    {
        return (filter, false);
    }
    if let Some(filter) = cli_level.and_then(|v| EnvFilter::try_new(v).ok()) {
        return (filter, false);
    }
    (EnvFilter::new(BOOTSTRAP_LEVEL), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_cli_level() {
        let (filter, from_config) = bootstrap_filter(Some("dailychat=trace".into()), Some("error"));
        assert_eq!(filter.to_string(), "dailychat=trace");
        assert!(!from_config);
    }

    #[test]
    fn cli_level_wins_over_config() {
        let (filter, from_config) = bootstrap_filter(None, Some("debug"));
        assert_eq!(filter.to_string(), "debug");
        assert!(!from_config);
    }

    #[test]
    fn blank_or_invalid_rust_log_falls_through() {
        let (_, from_config) = bootstrap_filter(Some("  ".into()), None);
        assert!(from_config);
        let (filter, from_config) = bootstrap_filter(Some("dailychat=loud".into()), Some("warn"));
        assert_eq!(filter.to_string(), "warn");
        assert!(!from_config);
    }

    #[test]
    fn config_decides_when_nothing_else_does() {
        let (filter, from_config) = bootstrap_filter(None, None);
        assert_eq!(filter.to_string(), BOOTSTRAP_LEVEL);
        assert!(from_config);
    }
}
