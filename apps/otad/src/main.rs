//! otad - on-device OTA update agent
//!
//! Downloads signed update archives, verifies them, and atomically
//! switches the device to the new version with automatic rollback to the
//! previous or factory version when an install goes bad.

mod callback;
mod cli;
mod error;
mod events;
mod logging;
mod server;
mod setup;

use crate::cli::{Cli, Commands};
use crate::error::FatalError;
use clap::Parser;
use otad_config::{Config, DEFAULT_CONFIG_PATH, DEFAULT_INSTALL_ROOT};
use otad_engine::UpdateEngine;
use otad_layout::VersionLayout;
use otad_net::{NetClient, ProgressReporter};
use otad_services::{ServiceManager, SystemdManager};
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), FatalError> {
    let mut config = load_config(cli.config.as_deref()).await?;
    config.merge_env().map_err(FatalError::Config)?;
    if let Some(root) = &cli.install_root {
        config.install_root = root.clone();
    }
    if let Some(port) = cli.port {
        config.general.listen_port = port;
    }
    if let Some(url) = &cli.callback_url {
        config.general.callback_url = Some(url.clone());
    }
    config.validate().map_err(FatalError::Config)?;

    setup::bootstrap(&config).await?;
    let _log_guard = logging::init(&config.paths().logs_dir(), cli.debug);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        install_root = %config.install_root.display(),
        "otad starting"
    );

    match cli.command {
        Some(Commands::Provision { package, version }) => {
            setup::provision(&config, &package, &version).await
        }
        Some(Commands::Run) | None => serve(config).await,
    }
}

async fn load_config(flag: Option<&Path>) -> Result<Config, FatalError> {
    match flag {
        Some(path) => Config::load(path).await.map_err(FatalError::Config),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::load(default).await.map_err(FatalError::Config)
            } else {
                Ok(Config::with_install_root(DEFAULT_INSTALL_ROOT))
            }
        }
    }
}

async fn serve(config: Config) -> Result<(), FatalError> {
    // Bind before anything else so a port conflict fails fast with its
    // documented exit code.
    let addr = SocketAddr::from(([127, 0, 0, 1], config.general.listen_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| FatalError::PortInUse {
            port: config.general.listen_port,
            source: e,
        })?;

    let (tx, rx) = otad_events::channel();
    tokio::spawn(events::mirror_events(rx));

    let services: Arc<dyn ServiceManager> = Arc::new(SystemdManager::new(Duration::from_secs(
        config.services.stop_timeout_secs,
    )));
    let (engine, engine_task) = UpdateEngine::spawn(config.clone(), services, tx).await?;

    if let Some(url) = &config.general.callback_url {
        let client = NetClient::new(&config.network)?;
        let reporter = ProgressReporter::new(client, url.clone());
        tokio::spawn(callback::forward_snapshots(
            engine.snapshot_reader(),
            reporter,
        ));
    }

    let state = server::AppState {
        engine: engine.clone(),
        layout: VersionLayout::new(&config.install_root),
    };
    info!(addr = %addr, "api listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| FatalError::Runtime(otad_errors::Error::internal(e.to_string())))?;

    info!("shutdown signal received, stopping engine");
    engine.shutdown().await;
    let _ = engine_task.await;
    info!("clean shutdown");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
