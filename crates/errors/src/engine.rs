//! Orchestrator state machine error types

use crate::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("another operation is active (stage {stage})")]
    Conflict { stage: String },

    #[error("no package parked for install")]
    NothingToInstall,

    #[error("trust window expired for package verified at {verified_at}")]
    PackageExpired { verified_at: String },

    #[error("requested version {requested} does not match parked version {parked}")]
    VersionMismatch { requested: String, parked: String },

    #[error("deployment failed: {message}")]
    DeploymentFailed { message: String },

    #[error("rollback failed: {message}")]
    RollbackFailed { message: String },
}

impl EngineError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Conflict { .. } | Self::NothingToInstall => ErrorCode::Conflict,
            Self::PackageExpired { .. } => ErrorCode::PackageExpired,
            Self::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            Self::DeploymentFailed { .. } => ErrorCode::DeploymentFailed,
            Self::RollbackFailed { .. } => ErrorCode::RollbackFailed,
        }
    }
}
