//! Unified error handling for fand
//!
//! This crate provides the single error type shared by the protocol layer,
//! the core library, the daemon and the client tools. Variants are grouped by
//! the taxonomy the server uses to decide how a failing connection is closed.

use std::io;

/// Result type alias using FandError
pub type Result<T> = std::result::Result<T, FandError>;

/// Coarse error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Serialization,
    Protocol,
    Domain,
    Config,
    Hardware,
    Lifecycle,
}

/// Unified error type for all fand operations
#[derive(thiserror::Error, Debug)]
pub enum FandError {
    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {context}: {source}")]
    Io {
        context: String,
        source: io::Error,
    },

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Partial write: sent {sent} of {expected} bytes")]
    PartialWrite {
        sent: usize,
        expected: usize,
    },

    // ============================================================================
    // Serialization Errors
    // ============================================================================
    #[error("Cannot serialize message: {0}")]
    Serialization(String),

    // ============================================================================
    // Protocol Errors
    // ============================================================================
    #[error("Invalid request: {0}")]
    UnknownRequest(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        expected: String,
        got: String,
    },

    // ============================================================================
    // Domain Errors
    // ============================================================================
    #[error("Shelf {0} not found")]
    ShelfNotFound(String),

    #[error("{0}")]
    InvalidValue(String),

    #[error("Expiration {expire} is before now {now}")]
    ExpiredTimestamp {
        expire: String,
        now: String,
    },

    #[error("Invalid curve for {class}: {reason}")]
    InvalidCurve {
        class: String,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No configuration file found")]
    MissingConfig,

    // ============================================================================
    // Hardware Errors
    // ============================================================================
    #[error("Hardware error: {0}")]
    Hardware(String),

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error("Program is terminating")]
    Terminating,
}

impl FandError {
    /// Wrap an I/O error, mapping socket timeouts to [`FandError::Timeout`]
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout(context),
            _ => Self::Io { context, source },
        }
    }

    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    pub fn invalid_call(msg: impl Into<String>) -> Self {
        Self::InvalidCall(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }

    pub fn unexpected_reply(expected: impl ToString, got: impl ToString) -> Self {
        Self::UnexpectedReply {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_)
            | Self::Io { .. }
            | Self::ConnectionReset(_)
            | Self::Corrupted(_)
            | Self::PartialWrite { .. } => ErrorKind::Transport,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::UnknownRequest(_) | Self::InvalidCall(_) | Self::UnexpectedReply { .. } => {
                ErrorKind::Protocol
            }
            Self::ShelfNotFound(_)
            | Self::InvalidValue(_)
            | Self::ExpiredTimestamp { .. }
            | Self::InvalidCurve { .. } => ErrorKind::Domain,
            Self::Config(_) | Self::MissingConfig => ErrorKind::Config,
            Self::Hardware(_) => ErrorKind::Hardware,
            Self::Terminating => ErrorKind::Lifecycle,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The peer went away (EOF or explicit DISCONNECT)
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }

    pub fn is_domain(&self) -> bool {
        self.kind() == ErrorKind::Domain
    }
}

impl From<serde_json::Error> for FandError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
