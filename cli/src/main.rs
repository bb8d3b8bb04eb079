//! Headless publishing host.
//!
//! `uplink` drives a streaming session from the command line: it loads
//! settings, starts a publish, prints status lines, and runs until the
//! session ends or the operator interrupts it.

use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use tracing::{info, warn};

use uplink_api::{session_channel, ConnectionEventSender};
use uplink_config::{FileStore, SessionSettings, SettingsStore};
use uplink_engine::{EngineFactory, LoopbackEngineFactory};
use uplink_platform::{ExecutionModePresenter, LogIndicator, ResourceGuard, UnsupportedLock};
use uplink_rtmp::RtmpEngineFactory;
use uplink_session::{SessionController, SessionDeps, SessionHandle, StatusSlot};

/// Headless live-stream publisher.
#[derive(Debug, Parser)]
#[command(name = "uplink", version, about)]
struct Args {
    /// Path to the settings file.
    #[arg(long, default_value = "uplink.json")]
    config: PathBuf,

    /// Destination to publish to, overriding the settings file.
    #[arg(long)]
    destination: Option<String>,

    /// Publish through the loopback engine instead of RTMP.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting uplink");

    let store = FileStore::new(args.config.clone());
    let settings = match store.load() {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %args.config.display(), "Using default settings: {}", e);
            SessionSettings::default()
        }
    };

    let destination = args
        .destination
        .clone()
        .unwrap_or_else(|| settings.destination_uri.clone());
    if destination.is_empty() {
        bail!("no destination: pass --destination or set destination_uri in the settings file");
    }

    let engine_factory: Box<dyn EngineFactory> = if args.dry_run {
        info!("Dry run: publishing through the loopback engine");
        Box::new(LoopbackEngineFactory::new())
    } else {
        Box::new(RtmpEngineFactory::new())
    };

    let (tx, rx) = session_channel();
    let events = ConnectionEventSender::new(tx.clone());
    let status = StatusSlot::new();

    let (shutdown_tx, shutdown_rx) = bounded(1);
    let mut presenter = ExecutionModePresenter::new(Box::new(LogIndicator::new()));
    presenter.set_shutdown_signal(shutdown_tx);

    let deps = SessionDeps {
        engine_factory,
        settings: Box::new(store),
        guard: ResourceGuard::new(
            Box::new(UnsupportedLock::new("wake")),
            Box::new(UnsupportedLock::new("network")),
        ),
        presenter,
        status: status.clone(),
    };

    let mut controller = SessionController::new(rx, events, deps);
    let worker = thread::spawn(move || {
        info!("Session thread starting");
        controller.run();
        info!("Session thread stopped");
    });

    let handle = SessionHandle::new(tx, status);
    handle.set_status_sink(Box::new(|line: &str| println!("{}", line)));
    handle.start_publish(&destination)?;

    // A headless host has no foreground surface; run the session as
    // backgrounded so a stream end also ends the process.
    if settings.allow_background_publish {
        handle.enter_background()?;
    } else {
        warn!("allow_background_publish is off; the process only exits on Ctrl-C");
    }

    wait_for_exit(shutdown_rx).await;

    let _ = handle.shutdown();
    worker
        .join()
        .map_err(|_| anyhow!("session thread panicked"))?;

    info!("uplink stopped");
    Ok(())
}

/// Waits until Ctrl-C or the session's own shutdown signal.
async fn wait_for_exit(shutdown_rx: Receiver<()>) {
    let session_over = tokio::task::spawn_blocking(move || {
        let _ = shutdown_rx.recv();
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        }
        _ = session_over => {
            info!("Session ended");
        }
    }
}
