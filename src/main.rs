//! Session hub daemon entrypoint: loads [`HubConfig`], opens the
//! [`Registry`], starts the maintenance loop, and runs until a signal
//! drives it through [`shutdown::shutdown_all`].
//!
//! Grounded in the daemon's original `main.rs` logging setup: file-backed
//! `env_logger` (never interleaved with a foreground TUI, since one isn't
//! owned by this core) plus `ctrlc` for graceful termination.

use anyhow::{Context, Result};
use clap::Parser;
use session_hub::{pty::PathPolicy, registry::Registry, shutdown, Fanout, HubConfig};
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// PTY supervisor and session-lifecycle daemon.
#[derive(Parser, Debug)]
#[command(name = "session-hub", version)]
struct Cli {
    /// Override the configuration directory (also settable via
    /// `HUB_CONFIG_DIR`).
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,
}

fn init_logging() -> Result<()> {
    let log_path = if let Ok(path) = std::env::var("HUB_LOG_FILE") {
        std::path::PathBuf::from(path)
    } else {
        HubConfig::config_dir().unwrap_or_else(|_| std::path::PathBuf::from("/tmp")).join("session-hub.log")
    };
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let log_file = std::fs::File::create(&log_path).with_context(|| format!("creating log file {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    if let Some(dir) = &cli.config_dir {
        std::env::set_var("HUB_CONFIG_DIR", dir);
    }

    let config = HubConfig::load().context("loading hub configuration")?;
    log::info!("starting session-hub, jobs_dir={}", config.jobs_dir.display());

    let path_policy = PathPolicy::new(config.allowed_path_prefixes.clone());
    let registry = Arc::new(Registry::open(config.jobs_dir.clone(), path_policy)?);
    let fanout = Arc::new(Fanout::new(config.max_subscribers_per_session));

    let shutdown_requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let flag = shutdown_requested.clone();
        ctrlc::set_handler(move || {
            log::info!("received shutdown signal");
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    let maintenance_registry = registry.clone();
    let maintenance_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            maintenance_registry.auto_archive_old();
            maintenance_registry.cleanup_deleted();
        }
    });

    while !shutdown_requested.load(std::sync::atomic::Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    maintenance_handle.abort();
    shutdown::shutdown_all(&registry, &fanout, &[], config.shutdown_timeout).await;

    Ok(())
}
