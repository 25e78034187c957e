//! Domain-specific error types for the eISCP session.
//!
//! All fallible operations return `Result<T, EiscpError>`.
//! Resolution errors never touch the live connection; connection errors are
//! terminal for the background tasks only and are reported, not retried.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the eISCP client.
#[derive(Debug, Error)]
pub enum EiscpError {
    // ── Session Errors ───────────────────────────────────────────
    /// A command or macro was issued before a successful `connect`.
    #[error("not connected")]
    NotConnected,

    /// The background read or write task terminated.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The receive buffer grew past the codec limit without a terminator.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Resolution Errors ────────────────────────────────────────
    /// The name is not in the command table.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The macro exists but has no destination with this name.
    #[error("macro `{name}` has no target `{target}`")]
    UnknownMacroTarget { name: String, target: String },

    /// The command was given the wrong number of arguments.
    #[error("`{command}` takes {expected} argument(s), got {got}")]
    ArgumentCount {
        command: String,
        expected: usize,
        got: usize,
    },

    /// A name was registered twice in one command table.
    #[error("duplicate command: {0}")]
    DuplicateCommand(String),

    // ── Navigation Errors ────────────────────────────────────────
    /// A macro step was not confirmed before the macro deadline.
    #[error("macro step {position} (`{step}`) unconfirmed after {attempts} attempt(s), {elapsed:?}")]
    MacroStepTimeout {
        step: String,
        position: usize,
        attempts: u32,
        elapsed: Duration,
    },
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EiscpError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        EiscpError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = EiscpError::ArgumentCount {
            command: "v".into(),
            expected: 1,
            got: 0,
        };
        assert_eq!(e.to_string(), "`v` takes 1 argument(s), got 0");

        let e = EiscpError::UnknownMacroTarget {
            name: "go".into(),
            target: "nowhere".into(),
        };
        assert!(e.to_string().contains("nowhere"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: EiscpError = io_err.into();
        assert!(matches!(e, EiscpError::Connection(_)));
    }

    #[tokio::test]
    async fn from_send_error() {
        let (tx, rx) = tokio::sync::mpsc::channel::<u8>(1);
        drop(rx);
        let e: EiscpError = tx.send(1).await.unwrap_err().into();
        assert!(matches!(e, EiscpError::ChannelClosed));
    }
}
