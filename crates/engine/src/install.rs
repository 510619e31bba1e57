//! Install worker: deployment, service restart, two-level rollback
//!
//! Runs on its own task. Every stage transition is routed back through the
//! engine's queue; this task only touches the version tree and the service
//! manager.

use crate::engine::WorkerMsg;
use otad_deploy::Deployer;
use otad_errors::{Error, ErrorCode, ServiceError, StorageError};
use otad_events::{EventEmitter, EventSender, UpdateEvent};
use otad_layout::{LinkName, VersionLayout};
use otad_services::{wait_healthy, ServiceManager, StopOutcome};
use otad_types::{RollbackTarget, UpdateStage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

pub(crate) struct InstallRunner {
    pub deployer: Deployer,
    pub layout: VersionLayout,
    pub services: Arc<dyn ServiceManager>,
    pub version: String,
    pub archive_path: PathBuf,
    /// Operator-configured start order; `None` falls back to manifest
    /// module order
    pub configured_order: Option<Vec<String>>,
    pub start_timeout: Duration,
    pub poll_interval: Duration,
    pub tx: EventSender,
    pub worker_tx: mpsc::UnboundedSender<WorkerMsg>,
}

pub(crate) struct InstallReport {
    pub version: String,
    pub result: std::result::Result<(), (ErrorCode, String)>,
    pub rolled_back_to: Option<RollbackTarget>,
    pub kill_failed: bool,
}

impl InstallRunner {
    pub(crate) async fn run(self) {
        let report = self.execute().await;
        let _ = self.worker_tx.send(WorkerMsg::InstallDone(report));
    }

    async fn execute(&self) -> InstallReport {
        // Materialization mutates nothing outside staging; a failure here
        // needs no rollback.
        let (manifest, _installed) = match self
            .deployer
            .install(&self.archive_path, &self.version)
            .await
        {
            Ok(result) => result,
            Err(e) => return self.report(Err((e.code(), e.to_string())), None, false),
        };
        let order = self
            .configured_order
            .clone()
            .unwrap_or_else(|| manifest.module_names());

        // Commit makes the new version current; from here on any failure
        // must restore a working version line.
        if let Err(e) = self.deployer.commit(&self.version, &manifest).await {
            return self.rollback(&order, e.code(), e.to_string()).await;
        }

        self.stage(
            UpdateStage::Rebooting,
            90,
            format!("restarting services for {}", self.version),
        );

        let kill_failed = self.stop_services(&order).await;
        if let Err((code, message)) = self.start_services(&order).await {
            let mut report = self.rollback(&order, code, message).await;
            report.kill_failed = kill_failed;
            return report;
        }
        self.report(Ok(()), None, kill_failed)
    }

    /// Stop in reverse start order. A unit that survives even SIGKILL is
    /// reported but does not abort the update; the restart may still
    /// replace it.
    async fn stop_services(&self, order: &[String]) -> bool {
        let mut kill_failed = false;
        for name in order.iter().rev() {
            match self.services.stop(name).await {
                Ok(outcome) => self.tx.emit(UpdateEvent::ServiceStopped {
                    name: name.clone(),
                    killed: outcome == StopOutcome::Killed,
                }),
                Err(Error::Service(ServiceError::KillFailed { .. })) => {
                    warn!(service = %name, "service survived SIGKILL, continuing");
                    kill_failed = true;
                }
                Err(e) => {
                    warn!(service = %name, error = %e, "service stop failed, continuing");
                }
            }
        }
        kill_failed
    }

    /// Start the gate service first and require it healthy before the
    /// rest; then all must report healthy within the timeout.
    async fn start_services(
        &self,
        order: &[String],
    ) -> std::result::Result<(), (ErrorCode, String)> {
        let Some((first, rest)) = order.split_first() else {
            return Ok(());
        };

        self.start_one(first).await?;
        let unhealthy = wait_healthy(
            &*self.services,
            std::slice::from_ref(first),
            self.start_timeout,
            self.poll_interval,
        )
        .await;
        if !unhealthy.is_empty() {
            return Err((
                ErrorCode::ServiceUnhealthy,
                format!("gate service {first} unhealthy after restart"),
            ));
        }

        for name in rest {
            self.start_one(name).await?;
        }
        let unhealthy =
            wait_healthy(&*self.services, rest, self.start_timeout, self.poll_interval).await;
        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err((
                ErrorCode::ServiceUnhealthy,
                format!("services unhealthy after restart: {}", unhealthy.join(", ")),
            ))
        }
    }

    async fn start_one(&self, name: &str) -> std::result::Result<(), (ErrorCode, String)> {
        self.services
            .start(name)
            .await
            .map_err(|e| (e.code(), e.to_string()))?;
        self.tx.emit(UpdateEvent::ServiceStarted {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Two-level rollback: previous first when it exists, factory as the
    /// last resort. The original failure is what gets reported; only a
    /// failed level-2 escalates to `ROLLBACK_FAILED`.
    async fn rollback(
        &self,
        order: &[String],
        code: ErrorCode,
        message: String,
    ) -> InstallReport {
        warn!(version = %self.version, error = %message, "install failed, rolling back");

        if self.layout.resolve(LinkName::Previous).await.is_some() {
            self.tx.emit(UpdateEvent::RollbackStarted {
                target: RollbackTarget::Previous,
            });
            match self.restore(RollbackTarget::Previous, order).await {
                Ok(()) => {
                    self.tx.emit(UpdateEvent::RollbackCompleted {
                        target: RollbackTarget::Previous,
                    });
                    return self.report(
                        Err((code, message)),
                        Some(RollbackTarget::Previous),
                        false,
                    );
                }
                Err(e) => {
                    warn!(error = %e, "rollback to previous failed, escalating to factory");
                }
            }
        }

        self.tx.emit(UpdateEvent::RollbackStarted {
            target: RollbackTarget::Factory,
        });
        match self.restore(RollbackTarget::Factory, order).await {
            Ok(()) => {
                self.tx.emit(UpdateEvent::RollbackCompleted {
                    target: RollbackTarget::Factory,
                });
                self.report(Err((code, message)), Some(RollbackTarget::Factory), false)
            }
            Err(e) => self.report(
                Err((
                    ErrorCode::RollbackFailed,
                    format!("rollback failed after {message}: {e}"),
                )),
                None,
                false,
            ),
        }
    }

    /// Switch the symlink set to the target line and bring services back
    /// up on it.
    async fn restore(&self, target: RollbackTarget, order: &[String]) -> Result<(), Error> {
        match target {
            RollbackTarget::Previous => {
                let version = self
                    .layout
                    .resolved_version(LinkName::Previous)
                    .await
                    .ok_or_else(|| {
                        Error::from(StorageError::DanglingSymlink {
                            name: LinkName::Previous.as_str().to_string(),
                        })
                    })?;
                self.layout.switch(&version).await?;
            }
            RollbackTarget::Factory => {
                self.layout.switch_to_factory().await?;
            }
        }

        for name in order.iter().rev() {
            let _ = self.services.stop(name).await;
        }
        for name in order {
            self.services.start(name).await?;
        }
        let unhealthy =
            wait_healthy(&*self.services, order, self.start_timeout, self.poll_interval).await;
        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Unhealthy { names: unhealthy }.into())
        }
    }

    fn stage(&self, stage: UpdateStage, percent: u8, message: String) {
        let _ = self.worker_tx.send(WorkerMsg::Stage {
            stage,
            percent,
            message,
        });
    }

    fn report(
        &self,
        result: std::result::Result<(), (ErrorCode, String)>,
        rolled_back_to: Option<RollbackTarget>,
        kill_failed: bool,
    ) -> InstallReport {
        InstallReport {
            version: self.version.clone(),
            result,
            rolled_back_to,
            kill_failed,
        }
    }
}
