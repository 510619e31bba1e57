#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Version tree and symlink management
//!
//! Owner of the `versions/` directory and the `current`/`previous`/`factory`
//! symlinks in the install root. All mutation goes through the staging-then-
//! rename and temp-symlink-then-rename primitives so that observers only
//! ever see complete version directories and resolving symlinks.

mod staging;
mod switch;

pub use staging::VersionStaging;

use otad_errors::{Error, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Well-known symlink names in the install root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkName {
    Current,
    Previous,
    Factory,
}

impl LinkName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::Factory => "factory",
        }
    }
}

/// Manager of the on-disk version tree
#[derive(Debug, Clone)]
pub struct VersionLayout {
    root: PathBuf,
}

impl VersionLayout {
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
    pub fn link_path(&self, name: LinkName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Create the `versions/` directory if missing.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures.
    pub async fn ensure_dirs(&self) -> Result<(), Error> {
        fs::create_dir_all(self.versions_dir())
            .await
            .map_err(|e| Error::io_with_path(&e, self.versions_dir()))?;
        Ok(())
    }

    /// Begin materializing `versions/<version>/` in a unique staging
    /// directory. The staging directory is removed on drop unless
    /// committed.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures creating the staging directory.
    pub async fn begin_staging(&self, version: &str) -> Result<VersionStaging, Error> {
        self.ensure_dirs().await?;
        VersionStaging::create(&self.versions_dir(), version).await
    }

    /// Remove staging directories orphaned by a process that died before
    /// committing or cleaning up. Intended to run unconditionally at
    /// startup: orphans are invisible to [`Self::installed`] and
    /// [`Self::gc`], so nothing else ever reclaims them. Returns the
    /// removed paths.
    ///
    /// # Errors
    ///
    /// Propagates directory listing failures; individual removal failures
    /// are logged and skipped.
    pub async fn sweep_staging(&self) -> Result<Vec<PathBuf>, Error> {
        let mut entries = match fs::read_dir(self.versions_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(&e, self.versions_dir())),
        };

        let mut removed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, self.versions_dir()))?
        {
            if !entry
                .file_name()
                .to_string_lossy()
                .starts_with(staging::STAGING_PREFIX)
            {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path).await {
                Ok(()) => removed.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "orphaned staging removal failed");
                }
            }
        }
        Ok(removed)
    }

    /// Commit a populated staging directory as `versions/<version>/`.
    ///
    /// If the version directory already exists the staging copy is
    /// discarded and the existing directory is returned untouched.
    ///
    /// # Errors
    ///
    /// Propagates rename failures.
    pub async fn commit(&self, staging: VersionStaging) -> Result<PathBuf, Error> {
        let final_dir = self.version_dir(staging.version());
        if fs::metadata(&final_dir).await.is_ok() {
            debug!(version = staging.version(), "version already installed, discarding staging");
            staging.discard().await;
            return Ok(final_dir);
        }
        staging.into_committed(&final_dir).await
    }

    /// Swap the symlink set so `version` becomes current.
    ///
    /// Writes `previous` first (pointing at the old current target), then
    /// renames a temp symlink over `current`. The displaced version
    /// directory stays on disk.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionMissing` when the target directory
    /// does not exist, otherwise propagates I/O failures.
    pub async fn switch(&self, version: &str) -> Result<(), Error> {
        let target = self.version_dir(version);
        self.switch_to_path(&target).await
    }

    /// Recovery switch to whatever `factory` resolves to.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DanglingSymlink` when `factory` does not
    /// resolve.
    pub async fn switch_to_factory(&self) -> Result<PathBuf, Error> {
        let target = self.resolve(LinkName::Factory).await.ok_or_else(|| {
            Error::from(StorageError::DanglingSymlink {
                name: LinkName::Factory.as_str().to_string(),
            })
        })?;
        self.switch_to_path(&target).await?;
        Ok(target)
    }

    pub(crate) async fn switch_to_path(&self, target: &Path) -> Result<(), Error> {
        let meta = fs::metadata(target).await.map_err(|_| {
            Error::from(StorageError::VersionMissing {
                version: target.display().to_string(),
            })
        })?;
        if !meta.is_dir() {
            return Err(StorageError::VersionMissing {
                version: target.display().to_string(),
            }
            .into());
        }

        let current_link = self.link_path(LinkName::Current);
        let old_target = fs::read_link(&current_link).await.ok();

        if let Some(old) = old_target {
            // `previous` must always resolve; a dangling old current is not
            // worth remembering.
            if old != target && fs::metadata(&old).await.is_ok() {
                switch::replace_symlink(&old, &self.link_path(LinkName::Previous)).await?;
            }
        }
        switch::replace_symlink(target, &current_link).await
    }

    /// Resolve one of the well-known symlinks to an existing directory.
    /// Dangling or absent links yield `None`.
    pub async fn resolve(&self, name: LinkName) -> Option<PathBuf> {
        let target = fs::read_link(self.link_path(name)).await.ok()?;
        let meta = fs::metadata(&target).await.ok()?;
        meta.is_dir().then_some(target)
    }

    /// Directory name a well-known symlink points at, when it resolves
    pub async fn resolved_version(&self, name: LinkName) -> Option<String> {
        let target = self.resolve(name).await?;
        Some(target.file_name()?.to_string_lossy().into_owned())
    }

    /// Installed versions, ascending by semver key (lexicographic
    /// fallback), modification time as tiebreak. Staging directories are
    /// excluded.
    ///
    /// # Errors
    ///
    /// Propagates directory read failures.
    pub async fn installed(&self) -> Result<Vec<String>, Error> {
        let mut entries = match fs::read_dir(self.versions_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(&e, self.versions_dir())),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, self.versions_dir()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await.ok();
            let Some(meta) = meta else { continue };
            if !meta.is_dir() {
                continue;
            }
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            versions.push((semver::Version::parse(&name).ok(), name, mtime));
        }

        versions.sort_by(|a, b| match (&a.0, &b.0) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.2.cmp(&b.2)),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)),
        });
        Ok(versions.into_iter().map(|(_, name, _)| name).collect())
    }

    /// Remove version directories that are not referenced by any of the
    /// three symlinks, keeping the newest `keep_n` unreferenced ones.
    /// Returns the removed version names.
    ///
    /// # Errors
    ///
    /// Propagates listing failures; individual removal failures are logged
    /// and skipped.
    pub async fn gc(&self, keep_n: usize) -> Result<Vec<String>, Error> {
        let mut protected = Vec::new();
        for name in [LinkName::Current, LinkName::Previous, LinkName::Factory] {
            if let Some(version) = self.resolved_version(name).await {
                protected.push(version);
            }
        }

        let installed = self.installed().await?;
        let mut candidates: Vec<String> = installed
            .into_iter()
            .filter(|v| !protected.contains(v))
            .collect();
        // Ascending order: everything before the newest keep_n goes.
        let cut = candidates.len().saturating_sub(keep_n);
        candidates.truncate(cut);

        let mut removed = Vec::new();
        for version in candidates {
            let dir = self.version_dir(&version);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => removed.push(version),
                Err(e) => {
                    warn!(version = %version, error = %e, "gc failed to remove version directory");
                }
            }
        }
        Ok(removed)
    }

    /// Point `factory` at an installed version. Provisioning-time only;
    /// the updater never rewrites `factory` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionMissing` when the version directory
    /// does not exist.
    pub async fn set_factory(&self, version: &str) -> Result<(), Error> {
        let target = self.version_dir(version);
        if fs::metadata(&target).await.is_err() {
            return Err(StorageError::VersionMissing {
                version: version.to_string(),
            }
            .into());
        }
        switch::replace_symlink(&target, &self.link_path(LinkName::Factory)).await
    }

    /// Point a module's device path at `current/<module>` via an atomic
    /// symlink replacement. Missing ancestors of `dst` are created first.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures; an existing non-symlink `dst` makes the
    /// rename fail rather than silently clobbering device files.
    pub async fn link_module(&self, module: &str, dst: &Path) -> Result<(), Error> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let target = self.link_path(LinkName::Current).join(module);
        switch::replace_symlink(&target, dst).await
    }

    /// Set `versions/<version>/` read-only: files 0444, directories 0555.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the recursive walk.
    pub async fn mark_readonly(&self, version: &str) -> Result<(), Error> {
        let dir = self.version_dir(version);
        tokio::task::spawn_blocking(move || mark_readonly_sync(&dir))
            .await
            .map_err(|e| Error::internal(format!("readonly task panicked: {e}")))?
    }
}

#[cfg(unix)]
fn mark_readonly_sync(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::symlink_metadata(path).map_err(|e| Error::io_with_path(&e, path))?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    if meta.is_dir() {
        for entry in std::fs::read_dir(path).map_err(|e| Error::io_with_path(&e, path))? {
            let entry = entry.map_err(|e| Error::io_with_path(&e, path))?;
            mark_readonly_sync(&entry.path())?;
        }
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o555))
            .map_err(|e| Error::io_with_path(&e, path))?;
    } else {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o444))
            .map_err(|e| Error::io_with_path(&e, path))?;
    }
    Ok(())
}
