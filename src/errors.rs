//! Error types shared across the bridge.

use std::fmt::{Display, Formatter};

use crate::acp::envelope::RpcError;

/// Shared bridge result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Bridge error enumeration covering transport, call, and lifecycle failures.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The agent process could not be started.
    Spawn(String),
    /// Write to (or read from) a closed or broken pipe.
    Io(String),
    /// A single inbound line could not be parsed as a JSON-RPC envelope.
    Parse(String),
    /// A call did not receive its response before the deadline.
    Timeout(String),
    /// The agent answered with a JSON-RPC error object.
    Remote(RpcError),
    /// The agent process exited or closed its stdout while calls were pending.
    ConnectionLost(String),
    /// An operation required a running agent but none is connected.
    NotRunning(String),
    /// A well-formed reply did not have the expected shape.
    Protocol(String),
    /// A file system path requested by the agent failed validation.
    PathViolation(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Remote(err) => write!(f, "remote error {}: {}", err.code, err.message),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        Self::Remote(err)
    }
}
