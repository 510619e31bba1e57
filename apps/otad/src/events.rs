//! Mirror domain events into tracing records

use otad_events::{EventReceiver, UpdateEvent};
use tracing::{debug, info, warn};

/// Drain the engine's event channel into the log. Runs until the engine
/// drops its sender.
pub async fn mirror_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        log_event(&event);
    }
}

fn log_event(event: &UpdateEvent) {
    match event {
        UpdateEvent::StageEntered { stage } => {
            info!(target: "otad", stage = %stage, "stage entered");
        }
        UpdateEvent::DownloadStarted {
            url,
            resumed_from,
            total_bytes,
        } => {
            info!(
                target: "otad",
                url = %url,
                resumed_from = resumed_from,
                total = total_bytes,
                "download started"
            );
        }
        UpdateEvent::DownloadProgress { bytes, total_bytes } => {
            debug!(target: "otad", bytes = bytes, total = total_bytes, "download progress");
        }
        UpdateEvent::DownloadCompleted { bytes } => {
            info!(target: "otad", bytes = bytes, "download completed");
        }
        UpdateEvent::PackageVerified { version, md5_hex } => {
            info!(target: "otad", version = %version, md5 = %md5_hex, "package verified");
        }
        UpdateEvent::VersionMaterialized { version } => {
            info!(target: "otad", version = %version, "version materialized");
        }
        UpdateEvent::VersionActivated { version } => {
            info!(target: "otad", version = %version, "version activated");
        }
        UpdateEvent::ServiceStopped { name, killed } => {
            if *killed {
                warn!(target: "otad", service = %name, "service stopped by SIGKILL");
            } else {
                info!(target: "otad", service = %name, "service stopped");
            }
        }
        UpdateEvent::ServiceStarted { name } => {
            info!(target: "otad", service = %name, "service start requested");
        }
        UpdateEvent::RollbackStarted { target } => {
            warn!(target: "otad", rollback_target = ?target, "rollback started");
        }
        UpdateEvent::RollbackCompleted { target } => {
            warn!(target: "otad", rollback_target = ?target, "rollback completed");
        }
        UpdateEvent::Finished { stage, error } => {
            info!(target: "otad", stage = %stage, error = ?error, "attempt finished");
        }
        UpdateEvent::Warning { message } => warn!(target: "otad", "{message}"),
        UpdateEvent::Debug { message } => debug!(target: "otad", "{message}"),
    }
}
