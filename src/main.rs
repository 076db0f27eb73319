#![forbid(unsafe_code)]

//! `data-playground` server binary.
//!
//! Bootstraps configuration, starts the WebSocket session service, and the
//! optional static host for the client bundle.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use data_playground::orchestrator::session_manager::SessionOrchestrator;
use data_playground::server::{static_host, ws, AppState};
use data_playground::{AppError, Result, ServerConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "data-playground", about = "R interpreter sessions over WebSocket", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the template directory seeding each run directory.
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Override the WebSocket port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the static client bundle directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("data-playground server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

fn load_config(args: &Cli) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::read_from_path(path)?,
        None => ServerConfig::default(),
    };

    if let Some(dir) = &args.template_dir {
        config.template_dir.clone_from(dir);
    }
    if let Some(port) = args.ws_port {
        config.ws_port = port;
    }
    if let Some(dir) = &args.static_dir {
        config.static_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(load_config(&args)?);
    info!(
        template_dir = %config.template_dir.display(),
        interpreter = config.interpreter.program,
        "configuration loaded"
    );

    let ct = CancellationToken::new();

    let static_handle = config.static_dir.clone().map(|dir| {
        let bind = config.static_addr();
        let static_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = static_host::serve_static(&dir, bind, static_ct).await {
                error!(%err, "static host failed");
            }
        })
    });
    if static_handle.is_none() {
        info!("no static_dir configured; static host disabled");
    }

    let state = AppState {
        orchestrator: Arc::new(SessionOrchestrator::new(Arc::clone(&config))),
        shutdown: ct.clone(),
    };
    let ws_ct = ct.clone();
    let ws_bind = config.ws_addr();
    let ws_handle = tokio::spawn(async move {
        if let Err(err) = ws::serve_ws(state, ws_bind, ws_ct).await {
            error!(%err, "websocket service failed");
        }
    });

    info!("data-playground ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = ws_handle.await;
    if let Some(handle) = static_handle {
        let _ = handle.await;
    }
    info!("data-playground shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

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
