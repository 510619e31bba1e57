//! Outbound progress callback task

use otad_events::SnapshotReader;
use otad_net::ProgressReporter;
use tracing::info;

/// Forward every snapshot replacement to the sibling service. Delivery is
/// best-effort; the reporter logs failures and drops them. The task ends
/// when the engine goes away.
pub async fn forward_snapshots(mut reader: SnapshotReader, reporter: ProgressReporter) {
    while let Some(snapshot) = reader.changed().await {
        reporter.report(&snapshot).await;
    }
    info!("progress callback task finished");
}
