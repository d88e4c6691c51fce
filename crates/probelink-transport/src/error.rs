//! Error types for transport operations.
//!
//! Covers the ways a serial link can fail before any protocol parsing
//! happens: the port cannot be opened, the line settings are rejected, an
//! operation runs past its deadline, or the device goes away.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while opening or driving a serial transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Port could not be opened.
    #[error("Failed to open {port}: {message}")]
    Open { port: String, message: String },

    /// Line parameters or control lines could not be applied.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Device is gone (unplugged, or the other end closed).
    #[error("Device disconnected: {port}")]
    Disconnected { port: String },

    /// Port enumeration failed.
    #[error("Port enumeration failed: {message}")]
    Enumeration { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a new open error.
    pub fn open(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new disconnected error.
    pub fn disconnected(port: impl Into<String>) -> Self {
        Self::Disconnected { port: port.into() }
    }

    /// Create a new enumeration error.
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error() {
        let error = TransportError::open("/dev/ttyUSB0", "Permission denied");
        assert!(matches!(error, TransportError::Open { .. }));
        assert_eq!(
            error.to_string(),
            "Failed to open /dev/ttyUSB0: Permission denied"
        );
    }

    #[test]
    fn test_timeout_error() {
        let error = TransportError::timeout(5000);
        assert_eq!(error.to_string(), "Operation timeout after 5000ms");
    }

    #[test]
    fn test_disconnected_error() {
        let error = TransportError::disconnected("COM3");
        assert_eq!(error.to_string(), "Device disconnected: COM3");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: TransportError = io.into();
        assert!(matches!(error, TransportError::Io(_)));
        assert_eq!(error.to_string(), "I/O error: pipe closed");
    }
}
