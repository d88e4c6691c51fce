//! Engine error type.

use probelink_transport::TransportError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by [`LinkEngine`](crate::LinkEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another connect call is still running.
    #[error("A connect sequence is already in progress")]
    ConnectInProgress,

    /// The operation needs an open link.
    #[error("Not connected")]
    NotConnected,

    /// Auto-baud detection was requested while the link is open.
    #[error("Cannot probe {port} while a connection is active")]
    ProbeWhileConnected { port: String },

    /// A lifecycle step ran past its deadline.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },

    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] probelink_core::Error),

    /// Failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl EngineError {
    pub fn probe_while_connected(port: impl Into<String>) -> Self {
        Self::ProbeWhileConnected { port: port.into() }
    }

    pub fn timeout(operation: &'static str, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(e))
    }
}
