//! On-disk layout of the install root

use std::path::{Path, PathBuf};

/// Well-known paths under the install root.
///
/// ```text
/// <root>/versions/<v>/<module>/...   materialized version trees
/// <root>/current                     symlink to the active version
/// <root>/previous                    symlink to the prior version
/// <root>/factory                     symlink to the provisioning version
/// <root>/tmp/state.json              persistent journal
/// <root>/tmp/<package_name>          download staging file
/// <root>/logs/                       agent log files
/// ```
#[derive(Debug, Clone)]
pub struct InstallPaths {
    root: PathBuf,
}

impl InstallPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    #[must_use]
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir().join(version)
    }

    #[must_use]
    pub fn current_link(&self) -> PathBuf {
        self.root.join("current")
    }

    #[must_use]
    pub fn previous_link(&self) -> PathBuf {
        self.root.join("previous")
    }

    #[must_use]
    pub fn factory_link(&self) -> PathBuf {
        self.root.join("factory")
    }

    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.tmp_dir().join("state.json")
    }

    #[must_use]
    pub fn staging_file(&self, file_name: &str) -> PathBuf {
        self.tmp_dir().join(file_name)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = InstallPaths::new("/opt/device");
        assert_eq!(paths.state_file(), PathBuf::from("/opt/device/tmp/state.json"));
        assert_eq!(
            paths.version_dir("1.2.0"),
            PathBuf::from("/opt/device/versions/1.2.0")
        );
        assert_eq!(paths.current_link(), PathBuf::from("/opt/device/current"));
        assert_eq!(
            paths.staging_file("app.zip"),
            PathBuf::from("/opt/device/tmp/app.zip")
        );
    }
}
