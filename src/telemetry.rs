//! Log subscriber setup for the stagewright binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! binary's job and happens once at startup.
//!
//! # Environment Variables
//!
//! - `STAGEWRIGHT_LOG`: Filter directives (falls back to `RUST_LOG`, then `info`)
//! - `STAGEWRIGHT_LOG_FORMAT`: `fmt` (default) or `json`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Fmt,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fmt" | "text" | "pretty" => Ok(Self::Fmt),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives, e.g. `stagewright=debug`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var("STAGEWRIGHT_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("STAGEWRIGHT_LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogFormat::Fmt),
        }
    }
}

impl LogConfig {
    /// Raise the filter to debug, as for a `--verbose` flag.
    pub fn verbose(mut self) -> Self {
        self.filter = "debug".to_string();
        self
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match config.format {
        LogFormat::Fmt => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("FMT".parse::<LogFormat>().unwrap(), LogFormat::Fmt);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_verbose_overrides_filter() {
        let config = LogConfig {
            filter: "warn".to_string(),
            format: LogFormat::Fmt,
        }
        .verbose();
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig {
            filter: "not a valid [filter".to_string(),
            format: LogFormat::Json,
        };
        init_logging(&config);
        init_logging(&config);
    }
}
