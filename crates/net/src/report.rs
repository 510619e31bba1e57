//! Outbound progress callback client
//!
//! Delivery is best-effort by contract: a failed POST is logged and
//! forgotten, and never blocks the update engine.

use crate::client::NetClient;
use otad_types::ProgressSnapshot;
use tracing::{debug, warn};

/// POSTs progress snapshots to the sibling device service.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    client: NetClient,
    url: String,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(client: NetClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Deliver one snapshot. Failures are swallowed after logging.
    pub async fn report(&self, snapshot: &ProgressSnapshot) {
        let body = match serde_json::to_value(snapshot) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "progress snapshot failed to serialize");
                return;
            }
        };
        match self.client.post_json(&self.url, &body).await {
            Ok(()) => debug!(stage = %snapshot.stage, percent = snapshot.percent, "progress reported"),
            Err(e) => warn!(url = %self.url, error = %e, "progress callback delivery failed"),
        }
    }
}
