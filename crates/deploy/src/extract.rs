//! Zip archive access
//!
//! All zip I/O runs under `spawn_blocking`; entry paths go through
//! `enclosed_name` so hostile archives cannot escape the staging
//! directory. Files are written through a temp name and renamed into
//! place.

use crate::invalid_manifest;
use otad_errors::{Error, PackageError, StorageError};
use otad_types::{Manifest, ModuleEntry};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::ZipArchive;

fn open_archive(path: &Path) -> Result<ZipArchive<File>, Error> {
    let file = File::open(path).map_err(|e| {
        Error::from(PackageError::UnreadableArchive {
            message: format!("{}: {e}", path.display()),
        })
    })?;
    ZipArchive::new(file).map_err(|e| {
        PackageError::UnreadableArchive {
            message: e.to_string(),
        }
        .into()
    })
}

/// Read and parse `manifest.json` from the archive root, plus the full
/// entry name list for source validation.
pub(crate) async fn read_manifest(
    archive_path: PathBuf,
) -> Result<(Manifest, Vec<String>), Error> {
    tokio::task::spawn_blocking(move || {
        let mut archive = open_archive(&archive_path)?;
        if archive.is_empty() {
            return Err(invalid_manifest("archive contains no entries"));
        }
        let entry_names: Vec<String> = archive.file_names().map(ToString::to_string).collect();

        let mut manifest_entry = archive
            .by_name("manifest.json")
            .map_err(|_| invalid_manifest("manifest.json missing from archive root"))?;
        let mut content = String::new();
        manifest_entry
            .read_to_string(&mut content)
            .map_err(|e| invalid_manifest(format!("manifest.json unreadable: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| invalid_manifest(format!("manifest.json malformed: {e}")))?;

        Ok((manifest, entry_names))
    })
    .await
    .map_err(|e| Error::internal(format!("archive task panicked: {e}")))?
}

/// Extract every module subtree into the staging directory, mirroring the
/// manifest layout: `<staging>/<module-name>/<path under src>`.
pub(crate) async fn extract_modules(
    archive_path: PathBuf,
    modules: Vec<ModuleEntry>,
    staging_dir: PathBuf,
) -> Result<(), Error> {
    tokio::task::spawn_blocking(move || {
        let mut archive = open_archive(&archive_path)?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                Error::from(PackageError::ExtractionFailed {
                    message: format!("entry {i}: {e}"),
                })
            })?;
            let Some(safe_path) = entry.enclosed_name() else {
                continue;
            };
            let is_dir = entry.is_dir();
            let Some(out_path) = destination_for(&safe_path, is_dir, &modules, &staging_dir)
            else {
                continue;
            };

            if is_dir {
                std::fs::create_dir_all(&out_path)
                    .map_err(|e| Error::io_with_path(&e, &out_path))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
            }
            let mode = entry.unix_mode();
            write_entry(&mut entry, &out_path, mode)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| Error::internal(format!("extraction task panicked: {e}")))?
}

/// Where an archive entry lands in staging, if any module claims it.
/// The `src` subtree is re-rooted under the module name; a `src` that is
/// itself a file lands as `<module>/<basename>`.
fn destination_for(
    entry_path: &Path,
    is_dir: bool,
    modules: &[ModuleEntry],
    staging_dir: &Path,
) -> Option<PathBuf> {
    for module in modules {
        let src = Path::new(module.src.trim_end_matches('/'));
        if entry_path == src {
            let module_root = staging_dir.join(&module.name);
            return Some(if is_dir {
                module_root
            } else {
                module_root.join(src.file_name()?)
            });
        }
        if let Ok(rel) = entry_path.strip_prefix(src) {
            return Some(staging_dir.join(&module.name).join(rel));
        }
    }
    None
}

fn write_entry<R: Read>(entry: &mut R, out_path: &Path, mode: Option<u32>) -> Result<(), Error> {
    let parent = out_path
        .parent()
        .ok_or_else(|| Error::internal("entry path has no parent"))?;
    let tmp_path = parent.join(format!(".extract-{}", Uuid::new_v4()));

    let mut tmp = File::create(&tmp_path).map_err(|e| map_write_err(&e, &tmp_path))?;
    std::io::copy(entry, &mut tmp).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        map_write_err(&e, &tmp_path)
    })?;
    drop(tmp);

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode));
    }

    std::fs::rename(&tmp_path, out_path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        Error::from(StorageError::AtomicRenameFailed {
            message: format!("{} -> {}: {e}", tmp_path.display(), out_path.display()),
        })
    })
}

fn map_write_err(e: &std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::StorageFull {
        StorageError::DiskFull {
            path: path.display().to_string(),
        }
        .into()
    } else {
        Error::io_with_path(e, path)
    }
}
