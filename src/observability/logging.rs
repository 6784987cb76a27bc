//! Structured logging for the service
//!
//! Output is configured from the environment:
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty or compact (default json)
//! - `LOG_SPANS`: `true` to log span open/close events
//! - `RUST_LOG`: replaces the level filter entirely when set
//!
//! The broker client and the HTTP stack are noisy at INFO, so their targets
//! are held at WARN unless `RUST_LOG` says otherwise.

use std::env;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a `LOG_LEVEL` value, falling back to INFO
pub fn parse_level(value: &str) -> Level {
    value.trim().parse().unwrap_or(Level::INFO)
}

/// Everything `init_logging` needs, resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub spans: bool,
    pub rust_log: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            spans: false,
            rust_log: None,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: lookup("LOG_LEVEL").map_or(defaults.level, |v| parse_level(&v)),
            format: lookup("LOG_FORMAT").map_or(defaults.format, |v| LogFormat::parse(&v)),
            spans: lookup("LOG_SPANS").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            rust_log: lookup("RUST_LOG").filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Dependencies that are chatty at INFO
const QUIET_TARGETS: &[&str] = &["lapin", "amq_protocol", "hyper", "warp", "tokio"];

/// Level filter with the quiet targets applied. `RUST_LOG` wins when set.
pub fn build_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return EnvFilter::new(directives);
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|target| format!("{target}=warn").parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

fn fmt_layer(settings: &LogSettings) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if settings.spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer().with_span_events(span_events);

    match settings.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().with_ansi(true).boxed(),
        LogFormat::Compact => layer.compact().with_ansi(true).with_target(false).boxed(),
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(settings: &LogSettings) {
    let filter = build_filter(settings.level, settings.rust_log.as_deref());
    let _ = tracing_subscriber::registry()
        .with(fmt_layer(settings))
        .with(filter)
        .try_init();
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    init_logging(&LogSettings::from_env());
}

/// Span around one broker publish
#[macro_export]
macro_rules! broker_span {
    ($($field:tt)*) => {
        tracing::info_span!("broker_operation", $($field)*)
    };
}

/// Span around one HTTP request
#[macro_export]
macro_rules! request_span {
    ($($field:tt)*) => {
        tracing::info_span!("http_request", $($field)*)
    };
}

pub use {broker_span, request_span};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_settings_default_when_unset() {
        assert_eq!(settings_from(&[]), LogSettings::default());
    }

    #[test]
    fn test_settings_from_environment() {
        let settings = settings_from(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "Compact"),
            ("LOG_SPANS", "TRUE"),
            ("RUST_LOG", "user_service=trace"),
        ]);

        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Compact);
        assert!(settings.spans);
        assert_eq!(settings.rust_log.as_deref(), Some("user_service=trace"));
    }

    #[test]
    fn test_spans_only_on_literal_true() {
        for value in ["1", "yes", "", "false"] {
            assert!(!settings_from(&[("LOG_SPANS", value)]).spans, "{value:?}");
        }
    }

    #[test]
    fn test_blank_rust_log_ignored() {
        assert_eq!(settings_from(&[("RUST_LOG", "   ")]).rust_log, None);
    }

    #[test]
    fn test_build_filter_quiets_dependencies() {
        let filter = build_filter(Level::DEBUG, None).to_string();
        assert!(filter.contains("lapin=warn"));
        assert!(filter.contains("amq_protocol=warn"));
        assert!(filter.contains("debug"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(&LogSettings::default());
        init_logging(&settings_from(&[("LOG_FORMAT", "pretty")]));
    }

    #[test]
    fn test_span_macros_expand() {
        let span = broker_span!(queue = "notification-service");
        let _entered = span.enter();
        let span = request_span!(method = "POST", path = "/users");
        let _entered = span.enter();
    }
}
