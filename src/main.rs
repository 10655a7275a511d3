//! Intercepting HTTP front end.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────┐    ┌────────────────┐    ┌───────────────┐
//!     ─────────────────────▶│   http   │───▶│    dispatch    │───▶│    routing    │
//!                           │  server  │    │     engine     │    │   registry    │
//!                           └────┬─────┘    └───────┬────────┘    └───────────────┘
//!                                │                  │ first match
//!                                │                  ▼
//!     Client Response       ┌────┴─────┐    ┌────────────────┐
//!     ◀─────────────────────│ response │◀───│ handler + sink │
//!                           │  stream  │    │  (LoadEvents)  │
//!                           └──────────┘    └────────────────┘
//!
//!     unhandled → passthrough client (optional) or 404
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use webview_proxy::config::{self, InterceptorConfig};
use webview_proxy::observability::{logging, metrics};
use webview_proxy::{DispatchEngine, HttpServer, RuleRegistry};

#[derive(Parser, Debug)]
#[command(name = "webview-proxy", version, about = "Intercept and answer requests before they reach the network")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Forward requests no rule matched to their origin.
    #[arg(long)]
    passthrough: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => InterceptorConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if cli.passthrough {
        config.listener.passthrough = true;
    }
    config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("webview-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        passthrough = config.listener.passthrough,
        rules = config.rules.len(),
        response_timeout_secs = config.listener.response_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let registry = Arc::new(RuleRegistry::new());
    config::install_rules(&registry, &config.rules)?;
    let engine = Arc::new(DispatchEngine::new(registry));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let server = HttpServer::new(config.listener, engine);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
