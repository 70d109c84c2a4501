//! Error types for luadbg
//!
//! Provides a unified error type used across all luadbg crates.

use std::path::PathBuf;

/// Main error type for luadbg operations
#[derive(Debug, thiserror::Error)]
pub enum LuadbgError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Not connected to a debug target")]
    NotConnected,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Send queue full ({capacity} messages pending)")]
    SendQueueFull { capacity: usize },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Not supported by the runtime: {0}")]
    Unsupported(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Persistence Errors ===

    #[error("Persistence error: {0}")]
    Persistence(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LuadbgError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the session must be torn down after this error.
    ///
    /// Malformed wire data has no resync primitive, so it ends the session
    /// along with a closed connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using LuadbgError
pub type Result<T> = std::result::Result<T, LuadbgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LuadbgError::SendQueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "Send queue full (8 messages pending)");
    }

    #[test]
    fn test_fatal() {
        assert!(LuadbgError::MalformedFrame("short header".into()).is_fatal());
        assert!(LuadbgError::ConnectionClosed.is_fatal());
        assert!(!LuadbgError::NotConnected.is_fatal());
        assert!(!LuadbgError::protocol("orphaned reply").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: LuadbgError = io_err.into();
        assert!(matches!(err, LuadbgError::Io(_)));
    }
}
