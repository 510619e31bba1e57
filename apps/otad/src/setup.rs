//! Install-root bootstrap and the provisioning command

use crate::error::FatalError;
use otad_config::Config;
use otad_deploy::Deployer;
use otad_layout::{LinkName, VersionLayout};
use std::path::Path;
use tracing::info;

/// Verify the install root and create the working directories.
///
/// The install root itself must already exist (it is provisioned with the
/// device); `versions/`, `tmp/`, and `logs/` are created as needed.
pub async fn bootstrap(config: &Config) -> Result<(), FatalError> {
    let root = &config.install_root;
    if !root.is_dir() {
        return Err(FatalError::InstallRoot { path: root.clone() });
    }
    let paths = config.paths();
    for dir in [paths.versions_dir(), paths.tmp_dir(), paths.logs_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FatalError::Runtime(otad_errors::Error::io_with_path(&e, &dir)))?;
    }
    Ok(())
}

/// Install an archive as the immutable factory version.
///
/// Materializes the version, marks it read-only, points `factory` at it,
/// and makes it `current` when no version is active yet.
pub async fn provision(config: &Config, package: &Path, version: &str) -> Result<(), FatalError> {
    let layout = VersionLayout::new(&config.install_root);
    let deployer = Deployer::new(layout.clone(), config.deploy.allowed_dst_roots.clone());

    let (manifest, installed) = deployer.install(package, version).await?;
    layout.mark_readonly(version).await?;
    layout.set_factory(version).await?;
    info!(version = %version, path = %installed.display(), "factory version provisioned");

    if layout.resolve(LinkName::Current).await.is_none() {
        deployer.commit(version, &manifest).await?;
        info!(version = %version, "factory version activated as current");
    }
    Ok(())
}
