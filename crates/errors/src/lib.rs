#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the otad update agent
//!
//! This crate provides fine-grained error types organized by domain, plus
//! the wire-visible error code taxonomy reported through the progress
//! endpoint and the outbound callback.

pub mod config;
pub mod engine;
pub mod network;
pub mod package;
pub mod service;
pub mod storage;

pub use config::ConfigError;
pub use engine::EngineError;
pub use network::NetworkError;
pub use package::PackageError;
pub use service::ServiceError;
pub use storage::StorageError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("package error: {0}")]
    Package(#[from] PackageError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Wire-visible code for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Package(e) => e.code(),
            Self::Service(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::Config(_) | Self::Internal(_) => ErrorCode::DeploymentFailed,
            Self::Cancelled => ErrorCode::Canceled,
            Self::Io { kind, .. } => {
                if *kind == std::io::ErrorKind::StorageFull {
                    ErrorCode::DiskFull
                } else {
                    ErrorCode::DeploymentFailed
                }
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for otad operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes exposed in progress snapshots and callback payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    Conflict,
    VersionMismatch,
    DownloadFailed,
    DiskFull,
    Md5Mismatch,
    InvalidManifest,
    PathTraversal,
    MissingSource,
    PackageExpired,
    DeploymentFailed,
    ProcessKillFailed,
    ServiceUnhealthy,
    RollbackOkAfterFailure,
    RollbackFailed,
    Canceled,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Conflict => "CONFLICT",
            Self::VersionMismatch => "VERSION_MISMATCH",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::DiskFull => "DISK_FULL",
            Self::Md5Mismatch => "MD5_MISMATCH",
            Self::InvalidManifest => "INVALID_MANIFEST",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::MissingSource => "MISSING_SOURCE",
            Self::PackageExpired => "PACKAGE_EXPIRED",
            Self::DeploymentFailed => "DEPLOYMENT_FAILED",
            Self::ProcessKillFailed => "PROCESS_KILL_FAILED",
            Self::ServiceUnhealthy => "SERVICE_UNHEALTHY",
            Self::RollbackOkAfterFailure => "ROLLBACK_OK_AFTER_FAILURE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::Md5Mismatch).unwrap();
        assert_eq!(json, "\"MD5_MISMATCH\"");
        let json = serde_json::to_string(&ErrorCode::PackageExpired).unwrap();
        assert_eq!(json, "\"PACKAGE_EXPIRED\"");
    }

    #[test]
    fn io_storage_full_maps_to_disk_full() {
        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::StorageFull,
            "no space left on device",
        ));
        assert_eq!(err.code(), ErrorCode::DiskFull);
    }

    #[test]
    fn domain_errors_convert_and_map() {
        let err: Error = NetworkError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Md5Mismatch);

        let err: Error = EngineError::Conflict {
            stage: "downloading".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }
}
