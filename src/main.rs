//! piradio - remote-controlled playback client
//!
//! Connects to the control server, plays what it is told to and keeps an
//! offline copy of remote tracks. Exits with a failure status on any fatal
//! playback error so a supervisor can restart it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bridge_traits::time::LogLevel;
use clap::Parser;
use core_runtime::config::{ClientConfig, FileConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{CoreService, ServiceDependencies};
use tokio::signal;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "piradio")]
#[command(about = "Remote-controlled audio playback client")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "PIRADIO_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file holding the device identity (ANF)
    #[arg(long, env = "PIRADIO_IDENTITY")]
    identity: Option<PathBuf>,

    /// Device identifier, overriding the identity file
    #[arg(long, env = "PIRADIO_DEVICE_ID")]
    device_id: Option<String>,

    /// Control server base URL
    #[arg(long, env = "PIRADIO_SERVER_URL")]
    server_url: Option<String>,

    /// Log output format: pretty, json or compact
    #[arg(long, env = "PIRADIO_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Minimum log level
    #[arg(long, default_value = "info", env = "PIRADIO_LOG_LEVEL")]
    log_level: LogLevel,

    /// Custom tracing filter, e.g. "core_playback=debug,core_remote=trace"
    #[arg(long, env = "RUST_LOG")]
    log_filter: Option<String>,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder();
        if let Some(path) = &self.config {
            let file = FileConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            builder = builder.with_file_config(file);
        }
        if let Some(path) = &self.identity {
            builder = builder.identity_file(path);
        }
        if let Some(id) = &self.device_id {
            builder = builder.device_id(id);
        }
        if let Some(url) = &self.server_url {
            builder = builder.server_url(url);
        }
        Ok(builder.build()?)
    }

    fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::default().with_level(self.log_level);
        if let Some(format) = self.log_format {
            logging = logging.with_format(format);
        }
        if let Some(filter) = &self.log_filter {
            logging = logging.with_filter(filter);
        }
        logging
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.logging_config()).context("Failed to initialize logging")?;

    let config = args.client_config()?;
    info!(
        device = %config.device_id,
        server = %config.remote.server_url,
        cache = %config.cache.root.display(),
        "Starting piradio"
    );

    let deps = ServiceDependencies::desktop(&config).context("Failed to set up adapters")?;
    CoreService::new(config, deps)
        .run_until(shutdown_signal())
        .await
        .context("Playback client failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
