//! Unit tests for `AppError` display format and conversions.

use acp_bridge::acp::envelope::RpcError;
use acp_bridge::AppError;

#[test]
fn display_prefixes_identify_the_variant() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Spawn("x".into()), "spawn: x"),
        (AppError::Io("x".into()), "io: x"),
        (AppError::Parse("x".into()), "parse: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::ConnectionLost("x".into()), "connection lost: x"),
        (AppError::NotRunning("x".into()), "not running: x"),
        (AppError::Protocol("x".into()), "protocol: x"),
        (AppError::PathViolation("x".into()), "path violation: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn remote_error_shows_code_and_message() {
    let err = AppError::from(RpcError::new(-32601, "Method not found"));
    assert_eq!(err.to_string(), "remote error -32601: Method not found");
}

#[test]
fn error_message_has_no_trailing_period() {
    let err = AppError::Io("write failed: broken pipe".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn toml_errors_become_config_errors() {
    let toml_err = toml::from_str::<toml::Value>("not = [valid").expect_err("invalid toml");
    let err = AppError::from(toml_err);
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Timeout("t".into()));
}

/// Codec and pipe failures convert into `Io`, which the framed reader and
/// writer rely on.
#[test]
fn io_errors_become_io_errors() {
    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io_err);
    assert!(matches!(&err, AppError::Io(msg) if msg == "pipe closed"));
    assert_eq!(err.to_string(), "io: pipe closed");
}
