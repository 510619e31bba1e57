//! Update package manifest
//!
//! Parsed from `manifest.json` at the archive root. The manifest is a closed
//! record type; structural validation happens at the parse boundary in the
//! deployer and nothing downstream touches raw JSON.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One module entry: a subtree inside the archive and the absolute device
/// path it is exposed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub src: String,
    pub dst: PathBuf,
}

/// Package manifest. Module order is also the service start order for
/// modules whose `name` names a managed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub modules: Vec<ModuleEntry>,
}

impl Manifest {
    /// Service start order: manifest-declared module order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_shape() {
        let json = r#"{
            "version": "1.0.0",
            "modules": [
                {"name": "app", "src": "app", "dst": "/opt/device/app"},
                {"name": "web", "src": "web/static", "dst": "/opt/device/web"}
            ]
        }"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.version, "1.0.0");
        assert_eq!(m.modules.len(), 2);
        assert_eq!(m.module_names(), vec!["app", "web"]);
        assert_eq!(m.modules[1].src, "web/static");
    }

    #[test]
    fn missing_fields_fail_to_parse() {
        let json = r#"{"version": "1.0.0", "modules": [{"name": "app", "src": "app"}]}"#;
        assert!(serde_json::from_str::<Manifest>(json).is_err());

        let json = r#"{"modules": []}"#;
        assert!(serde_json::from_str::<Manifest>(json).is_err());
    }
}
