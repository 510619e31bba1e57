//! Progress snapshot exposed to observers

use crate::UpdateStage;
use otad_errors::ErrorCode;
use serde::{Deserialize, Serialize};

/// Target version line a failed install was rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackTarget {
    Previous,
    Factory,
}

/// Last-writer-wins view of the engine's progress, replaced atomically on
/// every transition. Serialized verbatim on the poll endpoint and in the
/// outbound callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub stage: UpdateStage,
    #[serde(rename = "progress")]
    pub percent: u8,
    pub message: String,
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_to: Option<RollbackTarget>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(stage: UpdateStage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
            error: None,
            rolled_back_to: None,
        }
    }

    #[must_use]
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stage: UpdateStage::Failed,
            percent: 0,
            message: message.into(),
            error: Some(code),
            rolled_back_to: None,
        }
    }

    #[must_use]
    pub fn with_rollback(mut self, target: RollbackTarget) -> Self {
        self.rolled_back_to = Some(target);
        self
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::new(UpdateStage::Idle, 0, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_progress_field_name() {
        let snap = ProgressSnapshot::new(UpdateStage::Downloading, 42, "downloading package");
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["progress"], 42);
        assert_eq!(json["stage"], "downloading");
        assert_eq!(json["error"], serde_json::Value::Null);
        assert!(json.get("rolled_back_to").is_none());
    }

    #[test]
    fn rollback_note_round_trips() {
        let snap = ProgressSnapshot::failed(ErrorCode::ServiceUnhealthy, "install failed")
            .with_rollback(RollbackTarget::Previous);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"rolled_back_to\":\"previous\""));
        let back: ProgressSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn percent_is_clamped() {
        let snap = ProgressSnapshot::new(UpdateStage::Downloading, 150, "");
        assert_eq!(snap.percent, 100);
    }
}
