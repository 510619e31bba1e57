//! The single-writer engine task

use crate::handle::EngineHandle;
use crate::install::{InstallReport, InstallRunner};
use chrono::Utc;
use otad_config::Config;
use otad_deploy::Deployer;
use otad_errors::{EngineError, Error, ErrorCode, Result};
use otad_events::{EventEmitter, EventSender, SnapshotBus, UpdateEvent};
use otad_layout::{LinkName, VersionLayout};
use otad_net::{fetch_package, verify_package, DownloadOutcome, DownloadRequest, NetClient};
use otad_services::ServiceManager;
use otad_state::{PersistentState, StateStore};
use otad_types::{PackageDescriptor, ProgressSnapshot, RollbackTarget, UpdateStage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Trigger commands accepted by the engine task
pub(crate) enum Command {
    StartDownload {
        pkg: PackageDescriptor,
        reply: oneshot::Sender<Result<()>>,
    },
    StartInstall {
        version: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Reports from worker tasks back to the single writer
pub(crate) enum WorkerMsg {
    DownloadBytes(u64),
    DownloadDone(Result<DownloadOutcome>),
    Stage {
        stage: UpdateStage,
        percent: u8,
        message: String,
    },
    InstallDone(InstallReport),
}

/// The update engine. Constructed with [`UpdateEngine::spawn`], which runs
/// startup recovery and then hands back a handle plus the engine task.
pub struct UpdateEngine {
    config: Config,
    store: StateStore,
    layout: VersionLayout,
    deployer: Deployer,
    client: NetClient,
    services: Arc<dyn ServiceManager>,
    snapshot: SnapshotBus,
    tx: EventSender,
    cancel_tx: watch::Sender<bool>,
    worker_tx: mpsc::UnboundedSender<WorkerMsg>,
    worker_rx: mpsc::UnboundedReceiver<WorkerMsg>,
    cmd_rx: mpsc::Receiver<Command>,
    state: Option<PersistentState>,
    stage: UpdateStage,
    busy: bool,
    shutting_down: bool,
}

impl UpdateEngine {
    /// Run startup recovery and start the engine task.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built or the install root is
    /// unusable.
    pub async fn spawn(
        config: Config,
        services: Arc<dyn ServiceManager>,
        tx: EventSender,
    ) -> Result<(EngineHandle, tokio::task::JoinHandle<()>)> {
        let client = NetClient::new(&config.network)?;
        let layout = VersionLayout::new(&config.install_root);
        layout.ensure_dirs().await?;
        let store = StateStore::new(config.paths().state_file());
        let deployer = Deployer::new(
            layout.clone(),
            config.deploy.allowed_dst_roots.clone(),
        )
        .with_events(tx.clone());

        let snapshot = SnapshotBus::default();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);

        let mut engine = Self {
            config,
            store,
            layout,
            deployer,
            client,
            services,
            snapshot: snapshot.clone(),
            tx,
            cancel_tx,
            worker_tx,
            worker_rx,
            cmd_rx,
            state: None,
            stage: UpdateStage::Idle,
            busy: false,
            shutting_down: false,
        };
        engine.recover().await;

        let handle = EngineHandle { cmd_tx, snapshot };
        let task = tokio::spawn(engine.run());
        Ok((handle, task))
    }

    /// Startup recovery from whatever the journal says happened last.
    async fn recover(&mut self) {
        // Staging directories orphaned by a hard kill are invisible to
        // installed()/gc(); reclaim them before anything else.
        match self.layout.sweep_staging().await {
            Ok(removed) if !removed.is_empty() => {
                warn!(count = removed.len(), "removed orphaned staging directories");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "staging directory sweep failed"),
        }

        self.ensure_current().await;

        let Some(state) = self.store.load().await else {
            self.publish(ProgressSnapshot::default());
            return;
        };

        match state.stage {
            UpdateStage::Downloading => {
                // The download can be resumed by a re-triggered request; no
                // autonomous network activity on startup.
                info!(
                    version = %state.version,
                    bytes = state.bytes_downloaded,
                    "interrupted download journaled, awaiting re-trigger"
                );
                self.state = Some(state);
                self.stage = UpdateStage::Idle;
                self.publish(ProgressSnapshot::new(
                    UpdateStage::Idle,
                    0,
                    "interrupted download awaiting re-trigger",
                ));
            }
            UpdateStage::Verifying | UpdateStage::Installing | UpdateStage::Rebooting => {
                warn!(stage = %state.stage, "crashed mid-operation, discarding attempt");
                self.remove_staging(&state.file_name).await;
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "journal clear failed during recovery");
                }
                self.ensure_current().await;
                self.publish(ProgressSnapshot::default());
            }
            UpdateStage::ToInstall => {
                info!(version = %state.version, "verified package parked, install window preserved");
                self.stage = UpdateStage::ToInstall;
                self.publish(ProgressSnapshot::new(
                    UpdateStage::ToInstall,
                    100,
                    format!("package {} verified, awaiting install trigger", state.version),
                ));
                self.state = Some(state);
            }
            UpdateStage::Idle | UpdateStage::Success | UpdateStage::Failed => {
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "journal clear failed during recovery");
                }
                self.publish(ProgressSnapshot::default());
            }
        }
    }

    /// `current` must always resolve; fall back to factory when it does
    /// not.
    async fn ensure_current(&self) {
        if self.layout.resolve(LinkName::Current).await.is_some() {
            return;
        }
        match self.layout.switch_to_factory().await {
            Ok(target) => {
                warn!(target = %target.display(), "current was unusable, switched to factory");
            }
            Err(e) => {
                warn!(error = %e, "current does not resolve and factory recovery failed");
            }
        }
    }

    pub(crate) async fn run(mut self) {
        info!("update engine running");
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                Some(msg) = self.worker_rx.recv() => self.handle_worker_msg(msg).await,
                cmd = self.cmd_rx.recv(), if commands_open => match cmd {
                    Some(Command::StartDownload { pkg, reply }) => {
                        let result = self.handle_start_download(pkg).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::StartInstall { version, reply }) => {
                        let result = self.handle_start_install(&version).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) => {
                        self.shutting_down = true;
                        let _ = self.cancel_tx.send(true);
                    }
                    None => {
                        commands_open = false;
                        self.shutting_down = true;
                        let _ = self.cancel_tx.send(true);
                    }
                },
            }
            if self.shutting_down && !self.busy {
                break;
            }
        }
        info!("update engine stopped");
    }

    async fn handle_start_download(&mut self, pkg: PackageDescriptor) -> Result<()> {
        pkg.validate()?;

        if self.shutting_down {
            return Err(EngineError::Conflict {
                stage: "shutdown".to_string(),
            }
            .into());
        }
        if !self.stage.accepts_download() {
            // Idempotent re-trigger of the active download: accepted, no
            // progress reset.
            if self.stage == UpdateStage::Downloading
                && self.state.as_ref().is_some_and(|s| s.matches_package(&pkg))
            {
                return Ok(());
            }
            return Err(EngineError::Conflict {
                stage: self.stage.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let resume_from = match &self.state {
            Some(prior) if prior.matches_package(&pkg) => {
                prior.bytes_downloaded.min(pkg.size_bytes)
            }
            Some(prior) => {
                // A different package was parked or interrupted; its
                // staging file is dead weight now.
                let stale = prior.file_name.clone();
                self.remove_staging(&stale).await;
                0
            }
            None => 0,
        };

        let mut state = PersistentState::for_download(&pkg, now);
        state.bytes_downloaded = resume_from;
        self.store.save(&state).await?;

        let pct = percent(resume_from, pkg.size_bytes);
        self.state = Some(state);
        self.stage = UpdateStage::Downloading;
        self.tx.emit(UpdateEvent::StageEntered {
            stage: UpdateStage::Downloading,
        });
        self.publish(ProgressSnapshot::new(
            UpdateStage::Downloading,
            pct,
            format!("downloading {}", pkg.file_name),
        ));

        self.spawn_download(pkg, resume_from);
        Ok(())
    }

    fn spawn_download(&mut self, pkg: PackageDescriptor, resume_from: u64) {
        self.busy = true;
        let client = self.client.clone();
        let staging = self.config.paths().staging_file(&pkg.file_name);
        let step = self.config.update.progress_step_percent;
        let tx = self.tx.clone();
        let worker_tx = self.worker_tx.clone();
        let cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(async move {
            let request = DownloadRequest {
                descriptor: &pkg,
                staging_path: &staging,
                resume_from,
                progress_step_percent: step,
            };
            let progress_tx = worker_tx.clone();
            let result = fetch_package(&client, &request, &tx, &cancel_rx, move |bytes| {
                let _ = progress_tx.send(WorkerMsg::DownloadBytes(bytes));
            })
            .await;
            let _ = worker_tx.send(WorkerMsg::DownloadDone(result));
        });
    }

    async fn handle_start_install(&mut self, version: &str) -> Result<()> {
        if self.shutting_down {
            return Err(EngineError::Conflict {
                stage: "shutdown".to_string(),
            }
            .into());
        }
        if self.stage != UpdateStage::ToInstall {
            return Err(EngineError::Conflict {
                stage: self.stage.to_string(),
            }
            .into());
        }
        let Some(state) = &self.state else {
            return Err(EngineError::NothingToInstall.into());
        };
        if state.version != version {
            return Err(EngineError::VersionMismatch {
                requested: version.to_string(),
                parked: state.version.clone(),
            }
            .into());
        }
        let Some(verified_at) = state.verified_at else {
            return Err(Error::internal("parked package lacks a verification time"));
        };

        let now = Utc::now();
        let window = chrono::Duration::seconds(
            i64::try_from(self.config.update.trust_window_secs).unwrap_or(i64::MAX),
        );
        if now.signed_duration_since(verified_at) >= window {
            let file_name = state.file_name.clone();
            self.state = None;
            self.remove_staging(&file_name).await;
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "journal clear failed on expiry");
            }
            self.fail(
                ErrorCode::PackageExpired,
                format!("package verified at {verified_at} exceeded the trust window"),
                None,
            );
            return Err(EngineError::PackageExpired {
                verified_at: verified_at.to_rfc3339(),
            }
            .into());
        }

        let Some(state) = self.state.as_mut() else {
            return Err(EngineError::NothingToInstall.into());
        };
        state.stage = UpdateStage::Installing;
        state.last_update = now;
        let accepted = state.clone();
        if let Err(e) = self.store.save(&accepted).await {
            // Could not journal the transition; stay parked.
            if let Some(state) = self.state.as_mut() {
                state.stage = UpdateStage::ToInstall;
            }
            return Err(e);
        }

        self.stage = UpdateStage::Installing;
        self.tx.emit(UpdateEvent::StageEntered {
            stage: UpdateStage::Installing,
        });
        self.publish(ProgressSnapshot::new(
            UpdateStage::Installing,
            0,
            format!("installing {version}"),
        ));

        self.spawn_install(&accepted);
        Ok(())
    }

    fn spawn_install(&mut self, state: &PersistentState) {
        self.busy = true;
        let order = if self.config.services.start_order.is_empty() {
            None
        } else {
            Some(self.config.services.start_order.clone())
        };
        let runner = InstallRunner {
            deployer: self.deployer.clone(),
            layout: self.layout.clone(),
            services: Arc::clone(&self.services),
            version: state.version.clone(),
            archive_path: self.config.paths().staging_file(&state.file_name),
            configured_order: order,
            start_timeout: std::time::Duration::from_secs(
                self.config.services.start_timeout_secs,
            ),
            poll_interval: std::time::Duration::from_millis(
                self.config.services.poll_interval_ms,
            ),
            tx: self.tx.clone(),
            worker_tx: self.worker_tx.clone(),
        };
        tokio::spawn(runner.run());
    }

    async fn handle_worker_msg(&mut self, msg: WorkerMsg) {
        match msg {
            WorkerMsg::DownloadBytes(bytes) => self.note_download_bytes(bytes).await,
            WorkerMsg::DownloadDone(result) => {
                self.busy = false;
                if self.shutting_down {
                    if let Some(state) = &self.state {
                        let _ = self.store.save(state).await;
                    }
                    return;
                }
                match result {
                    Ok(outcome) => self.verify_downloaded(outcome).await,
                    Err(Error::Cancelled) => {}
                    Err(e) => self.fail_download(&e).await,
                }
            }
            WorkerMsg::Stage {
                stage,
                percent,
                message,
            } => {
                self.stage = stage;
                if let Some(state) = self.state.as_mut() {
                    state.stage = stage;
                    state.last_update = Utc::now();
                    let copy = state.clone();
                    if let Err(e) = self.store.save(&copy).await {
                        warn!(error = %e, "journal save failed on stage transition");
                    }
                }
                self.tx.emit(UpdateEvent::StageEntered { stage });
                self.publish(ProgressSnapshot::new(stage, percent, message));
            }
            WorkerMsg::InstallDone(report) => {
                self.busy = false;
                self.finish_install(report).await;
            }
        }
    }

    async fn note_download_bytes(&mut self, bytes: u64) {
        if self.stage != UpdateStage::Downloading {
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.advance_bytes(bytes, Utc::now());
        let pct = percent(state.bytes_downloaded, state.size_bytes);
        let message = format!("downloading {}", state.file_name);
        let copy = state.clone();
        if let Err(e) = self.store.save(&copy).await {
            warn!(error = %e, "journal save failed during download");
        }
        self.publish(ProgressSnapshot::new(UpdateStage::Downloading, pct, message));
    }

    async fn verify_downloaded(&mut self, outcome: DownloadOutcome) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.stage = UpdateStage::Verifying;
        state.last_update = Utc::now();
        let verifying = state.clone();
        if let Err(e) = self.store.save(&verifying).await {
            warn!(error = %e, "journal save failed entering verification");
        }
        self.stage = UpdateStage::Verifying;
        self.tx.emit(UpdateEvent::StageEntered {
            stage: UpdateStage::Verifying,
        });
        self.publish(ProgressSnapshot::new(
            UpdateStage::Verifying,
            100,
            "verifying package digest",
        ));

        let descriptor = verifying.descriptor();
        let staging = self.config.paths().staging_file(&descriptor.file_name);
        match verify_package(&outcome, &descriptor, &staging).await {
            Ok(()) => {
                let now = Utc::now();
                if let Some(state) = self.state.as_mut() {
                    state.mark_verified(now);
                    let parked = state.clone();
                    if let Err(e) = self.store.save(&parked).await {
                        warn!(error = %e, "journal save failed parking verified package");
                    }
                }
                self.stage = UpdateStage::ToInstall;
                self.tx.emit(UpdateEvent::PackageVerified {
                    version: descriptor.version.clone(),
                    md5_hex: outcome.md5_hex,
                });
                self.publish(ProgressSnapshot::new(
                    UpdateStage::ToInstall,
                    100,
                    format!(
                        "package {} verified, awaiting install trigger",
                        descriptor.version
                    ),
                ));
            }
            Err(e) => {
                // Staging file already deleted; the byte count resets.
                if let Some(state) = self.state.as_mut() {
                    state.bytes_downloaded = 0;
                    state.stage = UpdateStage::Failed;
                    let failed = state.clone();
                    if let Err(save_err) = self.store.save(&failed).await {
                        warn!(error = %save_err, "journal save failed recording digest mismatch");
                    }
                }
                self.fail(e.code(), e.to_string(), None);
            }
        }
    }

    /// Terminal download failure: the staging file goes, the journal keeps
    /// its byte count (monotonic until mismatch or completion).
    async fn fail_download(&mut self, e: &Error) {
        if let Some(state) = self.state.as_mut() {
            state.stage = UpdateStage::Failed;
            state.last_update = Utc::now();
            let failed = state.clone();
            self.remove_staging(&failed.file_name).await;
            if let Err(save_err) = self.store.save(&failed).await {
                warn!(error = %save_err, "journal save failed recording download failure");
            }
        }
        self.fail(e.code(), e.to_string(), None);
    }

    async fn finish_install(&mut self, report: InstallReport) {
        // Both outcomes retire the attempt: journal and staging go away.
        if let Some(state) = self.state.take() {
            self.remove_staging(&state.file_name).await;
        }
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "journal clear failed finishing install");
        }

        match report.result {
            Ok(()) => {
                self.stage = UpdateStage::Success;
                let mut message = format!("update {} complete", report.version);
                if report.kill_failed {
                    message.push_str(" (a service required forced termination)");
                }
                self.publish(ProgressSnapshot::new(UpdateStage::Success, 100, message));
                self.tx.emit(UpdateEvent::Finished {
                    stage: UpdateStage::Success,
                    error: None,
                });
                match self.layout.gc(self.config.update.keep_versions).await {
                    Ok(removed) if !removed.is_empty() => {
                        info!(?removed, "pruned unreferenced versions");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "version gc failed"),
                }
            }
            Err((code, message)) => {
                self.fail(code, message, report.rolled_back_to);
            }
        }
    }

    fn fail(&mut self, code: ErrorCode, message: String, rolled_back: Option<RollbackTarget>) {
        self.stage = UpdateStage::Failed;
        let mut snap = ProgressSnapshot::failed(code, message);
        if let Some(target) = rolled_back {
            snap = snap.with_rollback(target);
        }
        self.publish(snap);
        self.tx.emit(UpdateEvent::Finished {
            stage: UpdateStage::Failed,
            error: Some(code),
        });
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        self.snapshot.publish(snapshot);
    }

    async fn remove_staging(&self, file_name: &str) {
        let path = self.config.paths().staging_file(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "staging file removal failed"),
        }
    }
}

fn percent(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(bytes * 100 / total).unwrap_or(100)
}
