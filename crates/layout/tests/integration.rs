//! Integration tests for the version layout manager

use otad_layout::{LinkName, VersionLayout};
use std::path::PathBuf;
use tempfile::tempdir;

async fn install_version(layout: &VersionLayout, version: &str) -> PathBuf {
    let staging = layout.begin_staging(version).await.unwrap();
    tokio::fs::write(staging.path().join("payload.bin"), version.as_bytes())
        .await
        .unwrap();
    layout.commit(staging).await.unwrap()
}

#[tokio::test]
async fn commit_renames_staging_into_place() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    let dir = install_version(&layout, "1.0.0").await;
    assert_eq!(dir, layout.version_dir("1.0.0"));
    assert!(dir.join("payload.bin").exists());
    // No staging remnants.
    assert_eq!(layout.installed().await.unwrap(), vec!["1.0.0"]);
}

#[tokio::test]
async fn commit_over_existing_version_discards_staging() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    install_version(&layout, "1.0.0").await;
    let original = tokio::fs::read(layout.version_dir("1.0.0").join("payload.bin"))
        .await
        .unwrap();

    let staging = layout.begin_staging("1.0.0").await.unwrap();
    tokio::fs::write(staging.path().join("payload.bin"), b"different")
        .await
        .unwrap();
    let dir = layout.commit(staging).await.unwrap();

    // Existing directory untouched, staging gone.
    let after = tokio::fs::read(dir.join("payload.bin")).await.unwrap();
    assert_eq!(after, original);
    assert_eq!(layout.installed().await.unwrap(), vec!["1.0.0"]);
}

#[tokio::test]
async fn dropped_staging_is_removed() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    let staging = layout.begin_staging("2.0.0").await.unwrap();
    let staging_path = staging.path().to_path_buf();
    drop(staging);

    assert!(!staging_path.exists());
    assert!(layout.installed().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_removes_orphaned_staging_directories() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    install_version(&layout, "1.0.0").await;

    // An orphan from a killed process: cleanup-on-drop never ran.
    let staging = layout.begin_staging("2.0.0").await.unwrap();
    tokio::fs::write(staging.path().join("payload.bin"), b"partial")
        .await
        .unwrap();
    let orphan = staging.path().to_path_buf();
    std::mem::forget(staging);
    assert!(orphan.exists());

    let removed = layout.sweep_staging().await.unwrap();
    assert_eq!(removed, vec![orphan.clone()]);
    assert!(!orphan.exists());
    // Committed versions are untouched.
    assert_eq!(layout.installed().await.unwrap(), vec!["1.0.0"]);

    // Nothing left to sweep the second time around.
    assert!(layout.sweep_staging().await.unwrap().is_empty());
}

#[tokio::test]
async fn switch_updates_current_then_previous_chain() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    install_version(&layout, "1.0.0").await;
    install_version(&layout, "2.0.0").await;

    // First switch: no previous yet.
    layout.switch("1.0.0").await.unwrap();
    assert_eq!(
        layout.resolved_version(LinkName::Current).await.unwrap(),
        "1.0.0"
    );
    assert!(layout.resolve(LinkName::Previous).await.is_none());

    // Second switch: previous tracks the displaced version.
    layout.switch("2.0.0").await.unwrap();
    assert_eq!(
        layout.resolved_version(LinkName::Current).await.unwrap(),
        "2.0.0"
    );
    assert_eq!(
        layout.resolved_version(LinkName::Previous).await.unwrap(),
        "1.0.0"
    );
    // The displaced directory is retained on disk.
    assert!(layout.version_dir("1.0.0").exists());
}

#[tokio::test]
async fn switch_to_missing_version_fails_cleanly() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    install_version(&layout, "1.0.0").await;
    layout.switch("1.0.0").await.unwrap();

    assert!(layout.switch("9.9.9").await.is_err());
    // Symlink set untouched by the failed switch.
    assert_eq!(
        layout.resolved_version(LinkName::Current).await.unwrap(),
        "1.0.0"
    );
}

#[tokio::test]
async fn switch_to_factory_recovers() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    let factory_dir = install_version(&layout, "0.9.0").await;
    tokio::fs::symlink(&factory_dir, layout.link_path(LinkName::Factory))
        .await
        .unwrap();

    let target = layout.switch_to_factory().await.unwrap();
    assert_eq!(target, factory_dir);
    assert_eq!(
        layout.resolved_version(LinkName::Current).await.unwrap(),
        "0.9.0"
    );
}

#[tokio::test]
async fn installed_orders_by_semver_key() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    for v in ["2.0.0", "1.2.0", "1.10.0"] {
        install_version(&layout, v).await;
    }

    // Numeric semver ordering, not string ordering: 1.10.0 > 1.2.0.
    assert_eq!(
        layout.installed().await.unwrap(),
        vec!["1.2.0", "1.10.0", "2.0.0"]
    );
}

#[tokio::test]
async fn gc_spares_symlinked_and_recent_versions() {
    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    for v in ["0.9.0", "1.0.0", "1.1.0", "1.2.0", "2.0.0"] {
        install_version(&layout, v).await;
    }
    tokio::fs::symlink(
        layout.version_dir("0.9.0"),
        layout.link_path(LinkName::Factory),
    )
    .await
    .unwrap();
    layout.switch("1.2.0").await.unwrap();
    layout.switch("2.0.0").await.unwrap();

    // Unreferenced: 0.9.0 is factory, 1.2.0 previous, 2.0.0 current;
    // candidates are 1.0.0 and 1.1.0, keep the newest one of them.
    let removed = layout.gc(1).await.unwrap();
    assert_eq!(removed, vec!["1.0.0"]);
    assert!(!layout.version_dir("1.0.0").exists());
    assert!(layout.version_dir("1.1.0").exists());
    assert!(layout.version_dir("0.9.0").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn mark_readonly_sets_modes() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let layout = VersionLayout::new(temp.path());

    let staging = layout.begin_staging("1.0.0").await.unwrap();
    tokio::fs::create_dir(staging.path().join("app")).await.unwrap();
    tokio::fs::write(staging.path().join("app/bin"), b"x").await.unwrap();
    layout.commit(staging).await.unwrap();

    layout.mark_readonly("1.0.0").await.unwrap();

    let dir_mode = tokio::fs::metadata(layout.version_dir("1.0.0").join("app"))
        .await
        .unwrap()
        .permissions()
        .mode();
    let file_mode = tokio::fs::metadata(layout.version_dir("1.0.0").join("app/bin"))
        .await
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o555);
    assert_eq!(file_mode & 0o777, 0o444);
}
