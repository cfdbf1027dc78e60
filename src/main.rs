//! Greenlight movie catalogue API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ lifecycle (listener, signals, drain)
//!                   │
//!                   ▼
//!                http server (request id, trace, metrics, timeout)
//!                   │
//!                   ▼
//!                pipeline gate: recover ─▶ rate limit ─▶ authenticate
//!                   │
//!                   ▼
//!                handlers ──▶ store (credentials, users, movies)
//!                   │
//!                   └──▶ background tasks (welcome e-mail) ─▶ mailer
//! ```

use std::path::PathBuf;

use clap::Parser;

use greenlight::config::{read_config, validate_config, AppConfig, ConfigError};
use greenlight::observability::{logging, metrics};
use greenlight::{HttpServer, LifecycleManager};

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(about = "JSON API for a movie catalogue", long_about = None, version)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API server port.
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production).
    #[arg(long)]
    env: Option<String>,

    /// Rate limiter maximum requests per second.
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst.
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter.
    #[arg(long)]
    limiter_enabled: Option<bool>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.set_port(port);
        }
        if let Some(env) = &self.env {
            config.server.env = env.clone();
        }
        if let Some(rps) = self.limiter_rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.rate_limit.burst_size = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.rate_limit.enabled = enabled;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = greenlight::VERSION, "greenlight starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let grace = config.lifecycle.grace_period();
    let bind_address = config.server.bind_address.clone();
    let server = HttpServer::new(config);
    let manager = LifecycleManager::bind(&bind_address, grace, server.background()).await?;

    server.run(manager).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
