//! Classified failures of owner and author strategies.

use std::io;

use thiserror::Error;

/// Failure of a single strategy call.
///
/// Every variant except [`StrategyError::Unexpected`] and
/// [`StrategyError::Cancelled`] is an expected outcome that makes the
/// resolver move on to the next strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Likely-temporary I/O failure (network share hiccup, timeout).
    #[error("Transient I/O failure: {0}")]
    Transient(#[source] io::Error),

    /// The entry or its security information could not be read.
    #[error("Permission denied")]
    PermissionDenied,

    /// The entry disappeared.
    #[error("Not found")]
    NotFound,

    /// The format was parsed but holds no author.
    #[error("No author recorded")]
    NoData,

    /// The file is corrupt or not what its extension claims.
    #[error("Malformed {format} data: {message}")]
    Format {
        format: &'static str,
        message: String,
    },

    /// The container is not handled by this strategy.
    #[error("Unsupported format")]
    Unsupported,

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A strategy failed outside the classified paths (e.g. panicked).
    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    /// The scan was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl StrategyError {
    /// Classify an I/O error.
    pub fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            kind if is_transient_kind(kind) => Self::Transient(error),
            _ => Self::Io(error),
        }
    }

    /// Create a format error.
    pub fn format(format: &'static str, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            message: message.into(),
        }
    }

    /// Check if the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Check if the failure escaped the classified paths.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected(_))
    }
}

impl From<io::Error> for StrategyError {
    fn from(error: io::Error) -> Self {
        Self::from_io(error)
    }
}

/// I/O error kinds treated as transient.
pub fn is_transient_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
    )
}
