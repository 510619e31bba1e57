//! Update stage state machine vocabulary

use serde::{Deserialize, Serialize};

/// Stage of the update engine
///
/// Wire representation matches the progress endpoint contract
/// (`toInstall` camel case included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStage {
    Idle,
    Downloading,
    Verifying,
    ToInstall,
    Installing,
    Rebooting,
    Success,
    Failed,
}

impl UpdateStage {
    /// Stages in which the engine holds no in-flight operation
    #[must_use]
    pub fn is_quiescent(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::ToInstall | Self::Success | Self::Failed
        )
    }

    /// Terminal stages of a completed attempt
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// A new download trigger is acceptable from these stages
    #[must_use]
    pub fn accepts_download(self) -> bool {
        self.is_quiescent()
    }

    /// An install trigger is acceptable only from the parked stage
    #[must_use]
    pub fn accepts_install(self) -> bool {
        self == Self::ToInstall
    }
}

impl Default for UpdateStage {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::ToInstall => "toInstall",
            Self::Installing => "installing",
            Self::Rebooting => "rebooting",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&UpdateStage::ToInstall).unwrap(),
            "\"toInstall\""
        );
        assert_eq!(
            serde_json::to_string(&UpdateStage::Downloading).unwrap(),
            "\"downloading\""
        );
        let parsed: UpdateStage = serde_json::from_str("\"rebooting\"").unwrap();
        assert_eq!(parsed, UpdateStage::Rebooting);
    }

    #[test]
    fn trigger_acceptance() {
        assert!(UpdateStage::Idle.accepts_download());
        assert!(UpdateStage::ToInstall.accepts_download());
        assert!(UpdateStage::Failed.accepts_download());
        assert!(!UpdateStage::Downloading.accepts_download());
        assert!(!UpdateStage::Installing.accepts_download());

        assert!(UpdateStage::ToInstall.accepts_install());
        assert!(!UpdateStage::Idle.accepts_install());
    }
}
