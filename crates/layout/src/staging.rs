//! Staging directory for version materialization

use otad_errors::{Error, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Name prefix shared with the startup sweep that removes orphans left by
/// a hard kill (drop cleanup never ran).
pub(crate) const STAGING_PREFIX: &str = ".staging-";

/// A unique staging directory under `versions/` that either becomes the
/// final version directory via an atomic rename, or is removed.
///
/// Dropping an uncommitted staging directory removes it best-effort, so a
/// failed install never leaves a partial tree behind.
#[derive(Debug)]
pub struct VersionStaging {
    path: PathBuf,
    version: String,
    committed: bool,
}

impl VersionStaging {
    pub(crate) async fn create(versions_dir: &Path, version: &str) -> Result<Self, Error> {
        let path = versions_dir.join(format!("{STAGING_PREFIX}{version}-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;
        Ok(Self {
            path,
            version: version.to_string(),
            committed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rename the staging directory to its final location.
    pub(crate) async fn into_committed(mut self, final_dir: &Path) -> Result<PathBuf, Error> {
        fs::rename(&self.path, final_dir).await.map_err(|e| {
            Error::from(StorageError::AtomicRenameFailed {
                message: format!(
                    "{} -> {}: {e}",
                    self.path.display(),
                    final_dir.display()
                ),
            })
        })?;
        self.committed = true;
        Ok(final_dir.to_path_buf())
    }

    /// Remove the staging directory explicitly.
    pub(crate) async fn discard(mut self) {
        let _ = fs::remove_dir_all(&self.path).await;
        self.committed = true;
    }
}

impl Drop for VersionStaging {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
