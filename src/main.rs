//! CLI entry point (A3): parse arguments, load configuration, initialize
//! tracing, run the server until a shutdown signal arrives.
//!
//! Grounded on the teacher's `main.rs`: `clap::Parser` args, a
//! `RollingFileAppender` combined with stdout via `MakeWriterExt`, JSON
//! formatting, and `tokio::signal::ctrl_c()`-driven shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use framesrv::config::{FramingMode, ServerConfig};
use framesrv::error::{FrameError, Result};
use framesrv::server;

#[derive(Parser)]
#[command(
    name = "framesrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Multi-protocol TCP frame decoding and dispatch core"
)]
struct Args {
    /// Configuration file path (YAML).
    #[arg(short, long, default_value = "config/framesrv.yaml")]
    config: PathBuf,

    /// Override the listener port from the configuration file.
    #[arg(short, long, env = "FRAMESRV_TCP_PORT")]
    port: Option<u16>,

    /// Override the framing mode (auto, raw, length-field, json-object, line, modbus-rtu).
    #[arg(long, env = "FRAMESRV_TCP_FRAMING")]
    framing: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for rotating log files.
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

fn parse_framing(value: &str) -> Result<FramingMode> {
    match value.to_lowercase().as_str() {
        "auto" => Ok(FramingMode::Auto),
        "raw" => Ok(FramingMode::Raw),
        "length-field" => Ok(FramingMode::LengthField),
        "json-object" => Ok(FramingMode::JsonObject),
        "line" => Ok(FramingMode::Line),
        "modbus-rtu" => Ok(FramingMode::ModbusRtu),
        other => Err(FrameError::ConfigError(format!("unknown framing mode: {other}"))),
    }
}

fn init_tracing(log_level: &str, log_dir: &str) -> tracing_appender::non_blocking::WorkerGuard {
    std::fs::create_dir_all(log_dir).unwrap_or_else(|e| {
        eprintln!("failed to create log directory {log_dir}: {e}");
    });

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "framesrv.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking))
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(tracing::Level::INFO.into())),
        )
        .json()
        .with_target(false)
        .with_current_span(false)
        .init();

    guard
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    let _guard = init_tracing(&args.log_level, &args.log_dir);

    let mut config = match ServerConfig::load(Some(&args.config)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Some(port) = args.port {
        config.port = port;
    }

    if let Some(framing) = &args.framing {
        match parse_framing(framing) {
            Ok(mode) => config.framing = mode,
            Err(e) => {
                error!(error = %e, "invalid --framing override");
                return std::process::ExitCode::FAILURE;
            }
        }
    }

    info!(
        port = config.port,
        framing = ?config.framing,
        max_frame_length = config.max_frame_length,
        "starting framesrv"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = server::run(Arc::new(config), shutdown_rx, None).await;
    ctrl_c_task.abort();

    match result {
        Ok(()) => {
            info!("framesrv shut down cleanly");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "framesrv exited with error");
            std::process::ExitCode::FAILURE
        }
    }
}
