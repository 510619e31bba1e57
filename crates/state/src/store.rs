//! Journal file I/O

use crate::PersistentState;
use otad_errors::{Error, StorageError};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// Durable store for the [`PersistentState`] journal.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the journal. An absent or malformed file yields `None`;
    /// malformed content is logged and treated as absent, never fatal.
    pub async fn load(&self) -> Option<PersistentState> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "journal unreadable, treating as absent");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "journal malformed, treating as absent");
                None
            }
        }
    }

    /// Persist the journal atomically: write a temp file next to the real
    /// one, then rename over it.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures; a failed save leaves the previous journal
    /// intact.
    pub async fn save(&self, state: &PersistentState) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::StorageFull {
                StorageError::DiskFull {
                    path: tmp.display().to_string(),
                }
                .into()
            } else {
                Error::io_with_path(&e, &tmp)
            }
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            StorageError::JournalWriteFailed {
                message: format!("rename {} -> {}: {e}", tmp.display(), self.path.display()),
            }
            .into()
        })
    }

    /// Remove the journal; absent is fine.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures other than the file already being gone.
    pub async fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_with_path(&e, &self.path)),
        }
    }
}
