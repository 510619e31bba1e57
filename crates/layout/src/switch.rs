//! Atomic symlink replacement
//!
//! Renaming a symlink over an existing path is atomic on Linux; creating
//! the link at its final name is not. Every symlink mutation therefore goes
//! through a uniquely named temp link plus rename.

use otad_errors::{Error, StorageError};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

pub(crate) async fn replace_symlink(target: &Path, link: &Path) -> Result<(), Error> {
    let parent = link.parent().ok_or_else(|| {
        Error::from(StorageError::AtomicRenameFailed {
            message: format!("symlink {} has no parent directory", link.display()),
        })
    })?;
    let tmp = parent.join(format!(
        ".{}.new-{}",
        link.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    ));

    fs::symlink(target, &tmp)
        .await
        .map_err(|e| Error::io_with_path(&e, &tmp))?;

    if let Err(e) = fs::rename(&tmp, link).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::AtomicRenameFailed {
            message: format!("{} -> {}: {e}", tmp.display(), link.display()),
        }
        .into());
    }
    Ok(())
}
