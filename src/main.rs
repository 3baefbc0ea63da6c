#![forbid(unsafe_code)]

//! `study-supervisor`: user-study session server binary.
//!
//! Bootstraps configuration and the data directory, serves the HTTP API,
//! and stops every supervised program on shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use study_supervisor::config::GlobalConfig;
use study_supervisor::http::{self, AppState};
use study_supervisor::persistence::data_dir;
use study_supervisor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "study-supervisor", about = "User-study session server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Preferred data directory, tried before the environment candidates.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("study-supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match args.config.as_ref() {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    info!(bind = %config.bind_addr(), "configuration loaded");

    let data_dir = data_dir::resolve(config.data_dir.as_deref());
    let state = Arc::new(AppState::new(config, &data_dir));
    match tokio::task::spawn_blocking({
        let store = Arc::clone(&state.store);
        move || store.migrate()
    })
    .await
    {
        Ok(Ok(true)) => info!("feedback log migrated at startup"),
        Ok(Ok(false)) => {}
        Ok(Err(err)) => error!(%err, "feedback log migration failed; continuing"),
        Err(err) => error!(%err, "feedback log migration task failed; continuing"),
    }

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let server_state = Arc::clone(&state);
    let mut server_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(server_state, server_ct).await {
            error!(%err, "http server failed");
        }
    });

    let server_finished = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            false
        }
        joined = &mut server_handle => {
            if let Err(err) = joined {
                error!(%err, "http server task panicked");
            }
            true
        }
    };
    ct.cancel();

    let stopped = state.registry.stop_all().await;
    info!(sessions = stopped, "session registry flushed");

    if !server_finished {
        if let Err(err) = server_handle.await {
            error!(%err, "http server task panicked");
        }
    }
    info!("study-supervisor shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
