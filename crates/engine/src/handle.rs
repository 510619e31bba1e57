//! Public handle to the engine task

use crate::engine::Command;
use otad_errors::{Error, Result};
use otad_events::{SnapshotBus, SnapshotReader};
use otad_types::{PackageDescriptor, ProgressSnapshot};
use tokio::sync::{mpsc, oneshot};

/// Cheaply cloneable handle used by the HTTP surface and the callback
/// client. Trigger calls enqueue a command and wait only for the engine's
/// accept/reject decision, never for the operation itself; progress reads
/// bypass the engine queue entirely.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    pub(crate) cmd_tx: mpsc::Sender<Command>,
    pub(crate) snapshot: SnapshotBus,
}

impl EngineHandle {
    /// Trigger a download.
    ///
    /// # Errors
    ///
    /// `INVALID_REQUEST` for a malformed descriptor, `CONFLICT` while
    /// another operation is active.
    pub async fn start_download(&self, pkg: PackageDescriptor) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::StartDownload {
            pkg,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| Error::internal("engine dropped the reply"))?
    }

    /// Trigger the install of a previously verified package.
    ///
    /// # Errors
    ///
    /// `CONFLICT` unless a package is parked, `VERSION_MISMATCH` for the
    /// wrong version, `PACKAGE_EXPIRED` past the trust window.
    pub async fn start_install(&self, version: String) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::StartInstall {
            version,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| Error::internal("engine dropped the reply"))?
    }

    /// Current progress snapshot, lock-free
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.snapshot.current()
    }

    /// Subscription for the callback client
    #[must_use]
    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot.reader()
    }

    /// Ask the engine to finish its current atomic unit and exit.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::internal("engine task is gone"))
    }
}
