//! Storage and version-layout error types

use crate::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("disk full writing {path}")]
    DiskFull { path: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("atomic rename failed: {message}")]
    AtomicRenameFailed { message: String },

    #[error("version {version} already installed")]
    VersionExists { version: String },

    #[error("version {version} not installed")]
    VersionMissing { version: String },

    #[error("symlink {name} does not resolve")]
    DanglingSymlink { name: String },

    #[error("install root {path} missing or not a directory")]
    InvalidInstallRoot { path: String },

    #[error("journal write failed: {message}")]
    JournalWriteFailed { message: String },
}

impl StorageError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DiskFull { .. } => ErrorCode::DiskFull,
            _ => ErrorCode::DeploymentFailed,
        }
    }
}
