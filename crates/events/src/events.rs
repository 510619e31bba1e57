//! Domain events emitted by the update engine and its workers

use otad_errors::ErrorCode;
use otad_types::{RollbackTarget, UpdateStage};

/// Events flowing from the engine and workers to observers.
///
/// These are informational; the authoritative progress view is the
/// [`crate::SnapshotBus`]. Event delivery is fire-and-forget.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// The engine entered a new stage
    StageEntered { stage: UpdateStage },

    /// Download began (or resumed from a prior offset)
    DownloadStarted {
        url: String,
        resumed_from: u64,
        total_bytes: u64,
    },

    /// Download advanced past a progress step boundary
    DownloadProgress { bytes: u64, total_bytes: u64 },

    /// All bytes received, hash pending
    DownloadCompleted { bytes: u64 },

    /// Package hash verified against the descriptor
    PackageVerified { version: String, md5_hex: String },

    /// A version directory was materialized and committed
    VersionMaterialized { version: String },

    /// The symlink switch made a version current
    VersionActivated { version: String },

    /// A managed service was stopped (`killed` when escalation was needed)
    ServiceStopped { name: String, killed: bool },

    /// A managed service was asked to start
    ServiceStarted { name: String },

    /// Rollback began toward the given target
    RollbackStarted { target: RollbackTarget },

    /// Rollback finished; the device runs the target version line
    RollbackCompleted { target: RollbackTarget },

    /// An update attempt reached a terminal state
    Finished {
        stage: UpdateStage,
        error: Option<ErrorCode>,
    },

    /// Free-form warning
    Warning { message: String },

    /// Free-form debug detail
    Debug { message: String },
}
