mod config;
mod connection;
mod error;
mod fetcher;
mod ipc_server;
mod library;
mod macros;
mod platform;
mod protocol;
mod scheduler;
mod session;
mod store;
mod task;

use anyhow::{Context, Result};
use clap::Parser;
use common::{RotationState, SessionState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{Config, Overrides};
use crate::fetcher::HttpFetcher;
use crate::scheduler::Rotation;
use crate::session::{Session, SessionSettings};
use crate::store::TaskStore;

#[derive(Parser, Debug)]
#[command(name = "wallsync")]
#[command(about = "Wallpaper daemon driven by a remote task server", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/wallsync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address of the TCP task server
    #[arg(long)]
    tcp: Option<String>,

    /// Base address of the HTTP image server
    #[arg(long)]
    http: Option<String>,

    /// Secret word sent to the task server
    #[arg(long, env = "WALLSYNC_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Directory where downloaded images are stored
    #[arg(long)]
    path: Option<String>,

    /// Seconds each local image is shown while offline
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            tcp_address: self.tcp.clone(),
            http_address: self.http.clone(),
            secret: self.secret.clone(),
            storage_path: self.path.clone(),
            offline_interval: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(ref path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let loaded = Config::load_from_path(&config_path);

    let log_level = match loaded {
        Ok(ref cfg) => cfg.general.log_level.clone(),
        Err(_) => "info".to_string(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting wallsync v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());

    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            Config::default()
        }
    };
    config
        .apply_overrides(cli.overrides())
        .context("Invalid command-line options")?;

    let storage = config.storage_dir()?;

    log::info!("  Server settings:");
    log::info!("    - TCP: {}", config.server.tcp_address);
    log::info!("    - HTTP: {}", config.server.http_address);
    log::info!("    - Reconnect interval: {}s", config.server.reconnect_interval);
    log::info!("  Storage: {}", storage.display());
    log::info!("  Offline interval: {}s", config.rotation.offline_interval);
    if config.server.secret.is_empty() {
        log::warn!("No secret configured; the task server will likely reject us");
    }

    // Images already on disk rotate until the server sends a list
    let store = Arc::new(TaskStore::new(library::scan(
        &storage,
        &config.storage.extensions,
        config.rotation.offline_interval,
    )));

    let fetcher = Arc::new(
        HttpFetcher::new(&config.server.http_address, storage)
            .context("Failed to build HTTP client")?,
    );
    log::debug!("Downloads go to {}", fetcher.storage().display());
    let setter = Arc::new(platform::from_config(config.platform.command.as_deref()));

    let state = Arc::new(Mutex::new(DaemonState::new()));

    tokio::spawn(Rotation::new(Arc::clone(&store), setter).run(Arc::clone(&state)));

    let session = Session::new(
        SessionSettings {
            tcp_address: config.server.tcp_address.clone(),
            secret: config.server.secret.clone(),
            reconnect_interval: config.reconnect_interval(),
            connect_timeout: config.connect_timeout(),
        },
        Arc::clone(&store),
        fetcher,
        Arc::clone(&state),
    );
    tokio::spawn(async move {
        if let Err(e) = session.run().await {
            log::error!(
                "Task server session ended: {}. Continuing with the current task list.",
                e
            );
        }
    });

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_store = store.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, ipc_store).await {
            log::error!("IPC server error: {}", e);
        }
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        log_and_continue!(wait_for_signal().await, "install signal handlers");
        signal_state.lock().await.should_exit = true;
    });

    // The IPC server stops once the exit flag is set
    if let Err(e) = ipc_handle.await {
        log::error!("IPC server task failed: {}", e);
    }

    log::info!("Daemon shutting down");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            log::info!("Received SIGINT, shutting down...");
        }
    }

    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
    pub session: SessionState,
    pub rotation: RotationState,
    pub current_wallpaper: Option<String>,
}

impl DaemonState {
    fn new() -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
            session: SessionState::default(),
            rotation: RotationState::default(),
            current_wallpaper: None,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
