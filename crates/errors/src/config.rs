//! Configuration error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    FileRead { path: String, message: String },

    #[error("failed to parse config: {message}")]
    ParseError { message: String },

    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
