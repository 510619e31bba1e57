//! Last-writer-wins snapshot fan-out

use otad_types::ProgressSnapshot;
use tokio::sync::watch;

/// Write side of the snapshot channel, owned by the engine task.
///
/// Publishing replaces the snapshot atomically; readers never observe a
/// partially updated value and never contend with the writer.
#[derive(Debug, Clone)]
pub struct SnapshotBus {
    tx: watch::Sender<ProgressSnapshot>,
}

/// Read side handed to the poll endpoint and the callback client.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<ProgressSnapshot>,
}

impl SnapshotBus {
    #[must_use]
    pub fn new(initial: ProgressSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the current snapshot. Never blocks, never fails; with no
    /// subscribers the value is simply retained for future readers.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        let _ = self.tx.send(snapshot);
    }

    #[must_use]
    pub fn current(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SnapshotBus {
    fn default() -> Self {
        Self::new(ProgressSnapshot::default())
    }
}

impl SnapshotReader {
    /// Current snapshot without waiting
    #[must_use]
    pub fn current(&self) -> ProgressSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next replacement and return it. Returns `None` once the
    /// engine (the write side) has gone away.
    pub async fn changed(&mut self) -> Option<ProgressSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
