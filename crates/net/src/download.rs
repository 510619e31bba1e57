//! Streaming package download with incremental hashing and resume

use crate::client::NetClient;
use futures::StreamExt;
use md5::{Digest, Md5};
use otad_errors::{Error, NetworkError, StorageError};
use otad_events::{EventEmitter, EventSender, UpdateEvent};
use otad_types::PackageDescriptor;
use reqwest::StatusCode;
use std::path::Path;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::watch;

const SEED_BUFFER_SIZE: usize = 64 * 1024;

/// Inputs for one download attempt
#[derive(Debug)]
pub struct DownloadRequest<'a> {
    pub descriptor: &'a PackageDescriptor,
    pub staging_path: &'a Path,
    /// Journaled byte count of a prior attempt for the same URL; 0 starts
    /// fresh
    pub resume_from: u64,
    pub progress_step_percent: u8,
}

/// Result of a completed stream (hash not yet compared)
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub bytes: u64,
    pub md5_hex: String,
}

/// Stream the package into the staging file, hashing incrementally.
///
/// Resumes from the staging file's current length when `resume_from > 0`,
/// re-seeding the hash from the stored bytes; the hash state itself is
/// never persisted. `on_progress` fires at every `progress_step_percent`
/// advance and on completion, with the cumulative byte count; the caller
/// persists it.
///
/// # Errors
///
/// `DOWNLOAD_FAILED` on connection/status/stream errors, `DISK_FULL` when
/// the device runs out of space, `Cancelled` when the cancel signal fires
/// at a chunk boundary.
pub async fn fetch_package(
    client: &NetClient,
    request: &DownloadRequest<'_>,
    tx: &EventSender,
    cancel: &watch::Receiver<bool>,
    mut on_progress: impl FnMut(u64),
) -> Result<DownloadOutcome, Error> {
    let descriptor = request.descriptor;
    let total = descriptor.size_bytes;
    let staging = request.staging_path;

    let mut offset = resolve_offset(staging, request.resume_from, total).await;

    // Already complete on disk: hash what we have and skip the network.
    if offset == total && total > 0 {
        let hasher = seed_hasher(staging, offset).await?;
        tx.emit(UpdateEvent::DownloadCompleted { bytes: offset });
        on_progress(offset);
        return Ok(DownloadOutcome {
            bytes: offset,
            md5_hex: format!("{:x}", hasher.finalize()),
        });
    }

    let mut hasher = if offset > 0 {
        seed_hasher(staging, offset).await?
    } else {
        Md5::new()
    };

    let response = if offset > 0 {
        client.get_range(&descriptor.url, offset).await?
    } else {
        client.get(&descriptor.url).await?
    };

    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::HttpError {
            status: status.as_u16(),
            message: status.to_string(),
        }
        .into());
    }
    if offset > 0 && status == StatusCode::OK {
        // Server ignored the range request; start over.
        offset = 0;
        hasher = Md5::new();
    } else if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
        return Err(NetworkError::RangeNotSatisfiable { offset }.into());
    }

    let mut file = open_staging(staging, offset).await?;

    tx.emit(UpdateEvent::DownloadStarted {
        url: descriptor.url.clone(),
        resumed_from: offset,
        total_bytes: total,
    });

    let step = u64::from(request.progress_step_percent.max(1));
    let mut downloaded = offset;
    let mut last_reported = percent(downloaded, total);
    let mut stream = response.bytes_stream();
    let mut cancel = cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancelled(&mut cancel) => {
                file.flush().await?;
                on_progress(downloaded);
                return Err(Error::Cancelled);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    hasher.update(&chunk);
                    write_chunk(&mut file, &chunk, staging).await?;
                    downloaded += chunk.len() as u64;
                    if downloaded > total {
                        return Err(NetworkError::DownloadFailed(format!(
                            "server sent more than the declared {total} bytes"
                        ))
                        .into());
                    }
                    let pct = percent(downloaded, total);
                    if u64::from(pct) >= u64::from(last_reported) + step || downloaded == total {
                        last_reported = pct;
                        tx.emit(UpdateEvent::DownloadProgress {
                            bytes: downloaded,
                            total_bytes: total,
                        });
                        on_progress(downloaded);
                    }
                }
                Some(Err(e)) => {
                    return Err(NetworkError::DownloadFailed(e.to_string()).into());
                }
                None => break,
            }
        }
    }

    file.flush().await?;
    drop(file);

    if downloaded != total {
        return Err(NetworkError::StreamInterrupted { bytes: downloaded }.into());
    }

    tx.emit(UpdateEvent::DownloadCompleted { bytes: downloaded });
    on_progress(downloaded);

    Ok(DownloadOutcome {
        bytes: downloaded,
        md5_hex: format!("{:x}", hasher.finalize()),
    })
}

/// Compare the streamed hash against the descriptor, case-insensitively.
/// On mismatch the staging file is deleted so the next attempt starts
/// clean.
///
/// # Errors
///
/// `MD5_MISMATCH` with both digests when they differ.
pub async fn verify_package(
    outcome: &DownloadOutcome,
    descriptor: &PackageDescriptor,
    staging_path: &Path,
) -> Result<(), Error> {
    if outcome.md5_hex.eq_ignore_ascii_case(&descriptor.md5_hex) {
        return Ok(());
    }
    let _ = fs::remove_file(staging_path).await;
    Err(NetworkError::ChecksumMismatch {
        expected: descriptor.md5_hex.to_ascii_lowercase(),
        actual: outcome.md5_hex.clone(),
    }
    .into())
}

/// Reconcile the journaled offset with what is actually on disk.
async fn resolve_offset(staging: &Path, resume_from: u64, total: u64) -> u64 {
    if resume_from == 0 {
        return 0;
    }
    match fs::metadata(staging).await {
        Ok(meta) => {
            let len = meta.len();
            if len > total {
                // Oversized staging file cannot belong to this package.
                let _ = fs::remove_file(staging).await;
                0
            } else {
                len
            }
        }
        Err(_) => 0,
    }
}

/// Re-seed the running hash from bytes already stored in the staging file.
async fn seed_hasher(staging: &Path, bytes: u64) -> Result<Md5, Error> {
    let mut file = File::open(staging)
        .await
        .map_err(|e| Error::io_with_path(&e, staging))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; SEED_BUFFER_SIZE];
    let mut remaining = bytes;

    while remaining > 0 {
        let to_read = usize::try_from(remaining.min(buffer.len() as u64)).unwrap_or(buffer.len());
        let read = file
            .read(&mut buffer[..to_read])
            .await
            .map_err(|e| Error::io_with_path(&e, staging))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        remaining -= read as u64;
    }
    Ok(hasher)
}

async fn open_staging(staging: &Path, offset: u64) -> Result<File, Error> {
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    if offset > 0 {
        let mut file = OpenOptions::new()
            .write(true)
            .open(staging)
            .await
            .map_err(|e| Error::io_with_path(&e, staging))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::io_with_path(&e, staging))?;
        Ok(file)
    } else {
        File::create(staging)
            .await
            .map_err(|e| Error::io_with_path(&e, staging))
    }
}

async fn write_chunk(file: &mut File, chunk: &[u8], staging: &Path) -> Result<(), Error> {
    file.write_all(chunk).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            StorageError::DiskFull {
                path: staging.display().to_string(),
            }
            .into()
        } else {
            Error::io_with_path(&e, staging)
        }
    })
}

fn percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(downloaded * 100 / total).unwrap_or(100)
}

/// Resolves when cancellation is requested; pends forever once the sender
/// is gone (no cancellation possible anymore).
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
