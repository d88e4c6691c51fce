use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid value error for a configuration key.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = Error::config("missing section");
        assert!(matches!(error, Error::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: missing section");
    }

    #[test]
    fn test_invalid_value_display() {
        let error = Error::invalid_value("link.read_timeout_ms", "must be greater than zero");
        assert_eq!(
            error.to_string(),
            "Invalid value for link.read_timeout_ms: must be greater than zero"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
        assert!(error.to_string().starts_with("IO error:"));
    }
}
