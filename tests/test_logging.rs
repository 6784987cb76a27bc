//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing, level parsing and filter construction.

use tracing::Level;
use user_service::observability::logging::{build_filter, parse_level, LogFormat};

#[test]
fn test_log_format_parse() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    // Invalid formats should default to JSON for production safety
    assert!(matches!(LogFormat::parse("invalid"), LogFormat::Json));
    assert!(matches!(LogFormat::parse(""), LogFormat::Json));
    assert!(matches!(LogFormat::parse("  json  "), LogFormat::Json));
}

#[test]
fn test_parse_level_defaults_to_info() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("WARN"), Level::WARN);
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_filter_quiets_broker_and_http_crates() {
    let filter = build_filter(Level::TRACE, None).to_string();
    for target in ["lapin", "hyper", "warp"] {
        assert!(
            filter.contains(&format!("{target}=warn")),
            "{target} should be quieted in {filter}"
        );
    }
}

#[test]
fn test_rust_log_replaces_defaults() {
    let filter = build_filter(Level::INFO, Some("lapin=debug")).to_string();
    assert_eq!(filter, "lapin=debug");
}
