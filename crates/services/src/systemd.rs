//! `systemctl`-backed service manager

use crate::{ServiceManager, StopOutcome};
use async_trait::async_trait;
use otad_errors::{Error, ServiceError};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const KILL_SETTLE_POLLS: u32 = 4;
const KILL_SETTLE_INTERVAL: Duration = Duration::from_millis(500);

/// Controls units through the `systemctl` binary.
#[derive(Debug, Clone)]
pub struct SystemdManager {
    stop_timeout: Duration,
}

impl SystemdManager {
    #[must_use]
    pub fn new(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }

    async fn systemctl(args: &[&str]) -> Result<std::process::ExitStatus, Error> {
        let name = args.last().copied().unwrap_or_default();
        Command::new("systemctl")
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                ServiceError::ManagerFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl ServiceManager for SystemdManager {
    async fn stop(&self, name: &str) -> Result<StopOutcome, Error> {
        debug!(service = name, "stopping service");
        let graceful =
            tokio::time::timeout(self.stop_timeout, Self::systemctl(&["stop", name])).await;

        match graceful {
            Ok(Err(e)) => return Err(e),
            Ok(Ok(_status)) => {
                if !self.is_active(name).await {
                    return Ok(StopOutcome::Stopped);
                }
                // Stop returned but the unit still reports active.
            }
            // Grace period elapsed with systemctl still waiting.
            Err(_) => {}
        }

        warn!(service = name, "graceful stop exhausted, escalating to SIGKILL");
        Self::systemctl(&["kill", "-s", "SIGKILL", name]).await?;

        for _ in 0..KILL_SETTLE_POLLS {
            if !self.is_active(name).await {
                return Ok(StopOutcome::Killed);
            }
            tokio::time::sleep(KILL_SETTLE_INTERVAL).await;
        }
        Err(ServiceError::KillFailed {
            name: name.to_string(),
        }
        .into())
    }

    async fn start(&self, name: &str) -> Result<(), Error> {
        debug!(service = name, "starting service");
        let status = Self::systemctl(&["start", "--no-block", name]).await?;
        if status.success() {
            Ok(())
        } else {
            Err(ServiceError::ManagerFailed {
                name: name.to_string(),
                message: format!("systemctl start exited with {status}"),
            }
            .into())
        }
    }

    async fn is_active(&self, name: &str) -> bool {
        Self::systemctl(&["is-active", "--quiet", name])
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
