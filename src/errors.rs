//! Error types shared across the client.

use std::fmt::{Display, Formatter};

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering all failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A variable-length field does not fit its length prefix.
    FieldTooLong(String),
    /// A record failed validation at construction time.
    InvalidRecord(String),
    /// The record source could not be read.
    Source(String),
    /// Connect, read, or write failure on the aggregator connection.
    Transport(String),
    /// Transport failure caused by a shutdown force-closing the connection.
    Shutdown(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error was induced by a shutdown rather than a real fault.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::FieldTooLong(msg) => write!(f, "field too long: {msg}"),
            Self::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            Self::Source(msg) => write!(f, "source: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Shutdown(msg) => write!(f, "shutdown: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
