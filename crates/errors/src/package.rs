//! Package, manifest, and request validation error types

use crate::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PackageError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("destination path escapes permitted roots: {path}")]
    PathTraversal { path: String },

    #[error("module source {src} not present in archive")]
    MissingSource { src: String },

    #[error("archive extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("archive could not be opened: {message}")]
    UnreadableArchive { message: String },
}

impl PackageError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Self::InvalidManifest { .. } | Self::UnreadableArchive { .. } => {
                ErrorCode::InvalidManifest
            }
            Self::PathTraversal { .. } => ErrorCode::PathTraversal,
            Self::MissingSource { .. } => ErrorCode::MissingSource,
            Self::ExtractionFailed { .. } => ErrorCode::DeploymentFailed,
        }
    }
}
