//! Service controller error types

use crate::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("service manager invocation failed for {name}: {message}")]
    ManagerFailed { name: String, message: String },

    #[error("service {name} did not stop and could not be killed")]
    KillFailed { name: String },

    #[error("services unhealthy after restart: {}", names.join(", "))]
    Unhealthy { names: Vec<String> },
}

impl ServiceError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ManagerFailed { .. } => ErrorCode::DeploymentFailed,
            Self::KillFailed { .. } => ErrorCode::ProcessKillFailed,
            Self::Unhealthy { .. } => ErrorCode::ServiceUnhealthy,
        }
    }
}
