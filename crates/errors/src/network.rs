//! Network-related error types

use crate::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("md5 mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("range request from offset {offset} not honored by server")]
    RangeNotSatisfiable { offset: u64 },

    #[error("stream interrupted after {bytes} bytes")]
    StreamInterrupted { bytes: u64 },

    #[error("callback delivery failed: {0}")]
    CallbackFailed(String),
}

impl NetworkError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ChecksumMismatch { .. } => ErrorCode::Md5Mismatch,
            _ => ErrorCode::DownloadFailed,
        }
    }
}
