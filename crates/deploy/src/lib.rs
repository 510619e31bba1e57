#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Archive deployment: manifest interpretation and version materialization
//!
//! Turns a verified zip archive on disk into a complete
//! `versions/<version>/` tree, then commits it by switching the symlink set
//! and pointing each module's device path through `current`. A failed
//! install never mutates `current`/`previous`/`factory` and leaves no
//! staging directory behind.

mod extract;
mod validation;

use otad_errors::{Error, PackageError};
use otad_events::{EventEmitter, EventSender, UpdateEvent};
use otad_layout::VersionLayout;
use otad_types::Manifest;
use std::path::{Path, PathBuf};

/// Deploys verified archives into the version tree.
#[derive(Debug, Clone)]
pub struct Deployer {
    layout: VersionLayout,
    allowed_dst_roots: Vec<PathBuf>,
    tx: Option<EventSender>,
}

impl Deployer {
    #[must_use]
    pub fn new(layout: VersionLayout, allowed_dst_roots: Vec<PathBuf>) -> Self {
        Self {
            layout,
            allowed_dst_roots,
            tx: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Materialize the archive as `versions/<expected_version>/`.
    ///
    /// Reads and validates `manifest.json`, extracts every module subtree
    /// into a staging directory (per-file temp-then-rename), and renames
    /// the staging directory into place. Returns the parsed manifest and
    /// the installed path.
    ///
    /// # Errors
    ///
    /// `INVALID_MANIFEST`, `PATH_TRAVERSAL`, or `MISSING_SOURCE` for
    /// manifest violations; `DEPLOYMENT_FAILED`/`DISK_FULL` for extraction
    /// failures. On error the staging directory is removed.
    pub async fn install(
        &self,
        archive_path: &Path,
        expected_version: &str,
    ) -> Result<(Manifest, PathBuf), Error> {
        let (manifest, entry_names) = extract::read_manifest(archive_path.to_path_buf()).await?;

        validation::validate_manifest(
            &manifest,
            expected_version,
            &entry_names,
            self.layout.root(),
            &self.allowed_dst_roots,
        )?;

        let staging = self.layout.begin_staging(expected_version).await?;
        extract::extract_modules(
            archive_path.to_path_buf(),
            manifest.modules.clone(),
            staging.path().to_path_buf(),
        )
        .await?;

        let installed = self.layout.commit(staging).await?;
        self.tx.emit(UpdateEvent::VersionMaterialized {
            version: expected_version.to_string(),
        });
        Ok((manifest, installed))
    }

    /// Make an installed version current: symlink switch, then module
    /// device-path links through `current`.
    ///
    /// # Errors
    ///
    /// Propagates switch and linking failures; the caller decides whether
    /// a failure triggers rollback.
    pub async fn commit(&self, version: &str, manifest: &Manifest) -> Result<(), Error> {
        self.layout.switch(version).await?;
        for module in &manifest.modules {
            self.layout.link_module(&module.name, &module.dst).await?;
        }
        self.tx.emit(UpdateEvent::VersionActivated {
            version: version.to_string(),
        });
        Ok(())
    }
}

pub(crate) fn invalid_manifest(reason: impl Into<String>) -> Error {
    PackageError::InvalidManifest {
        reason: reason.into(),
    }
    .into()
}
