//! Error types for the logging subsystem

use std::fmt;

/// Errors that can occur in the logging subsystem
#[derive(Debug, Clone)]
pub enum LoggingError {
    /// A global subscriber was already installed, or installing it failed
    InitializationFailed(String),
    /// The configured level name is not one of trace/debug/info/warn/error
    InvalidLevel(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize logging: {}", msg)
            }
            LoggingError::InvalidLevel(level) => {
                write!(f, "Unknown log level: {}", level)
            }
        }
    }
}

impl std::error::Error for LoggingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_error_display() {
        let err = LoggingError::InitializationFailed("already set".to_string());
        assert_eq!(format!("{}", err), "Failed to initialize logging: already set");

        let err = LoggingError::InvalidLevel("verbose".to_string());
        assert_eq!(format!("{}", err), "Unknown log level: verbose");
    }
}
