//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Only [`AppError::Config`], [`AppError::Provisioning`] and
/// [`AppError::PipeCreation`] abort anything: the first stops the server
/// from starting, the other two abort a single session's setup. Every other
/// variant is logged where it occurs and the affected stream goes quiet.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Run directory creation, template listing, or template copy failure.
    Provisioning(String),
    /// Named pipe special file could not be created.
    PipeCreation(String),
    /// Interpreter process could not be started.
    InterpreterSpawn(String),
    /// Read or write failure on an interpreter stream or pipe channel.
    Stream(String),
    /// Malformed inbound protocol message.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Provisioning(msg) => write!(f, "provisioning: {msg}"),
            Self::PipeCreation(msg) => write!(f, "pipe creation: {msg}"),
            Self::InterpreterSpawn(msg) => write!(f, "interpreter spawn: {msg}"),
            Self::Stream(msg) => write!(f, "stream: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
