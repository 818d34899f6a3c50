//! Tests for logging configuration and the exported span macros
//!
//! The macros are `#[macro_export]`ed, so they are exercised here from
//! outside the crate the way downstream binaries use them.

use a2a_orchestrator::observability::logging::{init_logging, parse_level, LogFormat};
use a2a_orchestrator::{classification_span, handler_span, request_span};
use tracing::Level;

#[test]
fn test_log_format_parse_whitespace_defaults_to_json() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
}

#[test]
fn test_parse_level_is_case_insensitive() {
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("Debug"), Level::DEBUG);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_span_macros_carry_fields() {
    init_logging(Level::TRACE, LogFormat::Compact, true);

    let request = request_span!(request_id = "req-1", task_id = "task-1");
    let _request = request.enter();
    let handler = handler_span!(handler = "legal", order = 1);
    let _handler = handler.enter();
    let classification = classification_span!(chars = 42);
    let _classification = classification.enter();

    tracing::info!(agents = ?["legal"], "Classification complete");
}
