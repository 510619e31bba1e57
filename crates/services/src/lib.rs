#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Graceful stop / start / health query of managed services
//!
//! The engine talks to the OS service manager through the [`ServiceManager`]
//! trait; the production implementation shells out to `systemctl`. Tests
//! substitute scripted implementations at this seam.

mod systemd;

pub use systemd::SystemdManager;

use async_trait::async_trait;
use otad_errors::Error;
use std::time::Duration;
use tokio::time::Instant;

/// How a stop request concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Terminated within the grace period
    Stopped,
    /// Required SIGKILL escalation
    Killed,
}

/// Seam to the OS service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Request a stop, wait out the grace period, escalate to a kill.
    ///
    /// # Errors
    ///
    /// `PROCESS_KILL_FAILED` when the unit survives even the kill.
    async fn stop(&self, name: &str) -> Result<StopOutcome, Error>;

    /// Request a start without waiting for readiness.
    ///
    /// # Errors
    ///
    /// Returns an error when the request itself cannot be issued.
    async fn start(&self, name: &str) -> Result<(), Error>;

    /// Whether the unit currently reports active.
    async fn is_active(&self, name: &str) -> bool;
}

/// Poll `is_active` for every name until all are active or the deadline
/// passes. Returns the names that never became healthy, empty on success.
pub async fn wait_healthy(
    manager: &dyn ServiceManager,
    names: &[String],
    timeout: Duration,
    poll_interval: Duration,
) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut pending: Vec<String> = names.to_vec();

    loop {
        let mut still_down = Vec::new();
        for name in &pending {
            if !manager.is_active(name).await {
                still_down.push(name.clone());
            }
        }
        if still_down.is_empty() {
            return Vec::new();
        }
        if Instant::now() >= deadline {
            return still_down;
        }
        pending = still_down;
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Becomes active after a fixed number of polls
    struct SlowStarter {
        polls_until_active: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl ServiceManager for SlowStarter {
        async fn stop(&self, _name: &str) -> Result<StopOutcome, Error> {
            Ok(StopOutcome::Stopped)
        }

        async fn start(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn is_active(&self, _name: &str) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) >= self.polls_until_active
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_healthy_returns_empty_once_active() {
        let manager = SlowStarter {
            polls_until_active: 3,
            polls: AtomicU32::new(0),
        };
        let unhealthy = wait_healthy(
            &manager,
            &["app.service".to_string()],
            Duration::from_secs(30),
            Duration::from_millis(500),
        )
        .await;
        assert!(unhealthy.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_healthy_reports_stragglers_on_timeout() {
        let manager = SlowStarter {
            polls_until_active: u32::MAX,
            polls: AtomicU32::new(0),
        };
        let names = vec!["app.service".to_string(), "web.service".to_string()];
        let unhealthy = wait_healthy(
            &manager,
            &names,
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
        .await;
        assert_eq!(unhealthy, names);
    }
}
