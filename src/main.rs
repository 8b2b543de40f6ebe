//! Signature Proxy
//!
//! A reverse proxy that admits only requests whose JSON body is signed with
//! the operator's RSA key.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ net::listener ──▶ http::server ──▶ proxy::pipeline
//!                 (conn limit)      (timeouts,        │ security::provider (public key)
//!                                    request id)      │ proxy::sanitize    (strip sec/secval)
//!                                                     │ security::signature (RSA verify)
//!                                                     ▼
//!     Client Response                          proxy::upstream ──────▶ Upstream
//!     ◀────────── proxy::relay (stream) ◀──────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use signature_proxy::config::{load_config, ProxyConfig};
use signature_proxy::lifecycle::{signals, startup, Shutdown};
use signature_proxy::net::Listener;
use signature_proxy::observability::{logging, metrics};
use signature_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "signature-proxy", version, about = "Signature-verifying reverse proxy")]
struct Args {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the startup banner.
    #[arg(long)]
    no_banner: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    if config.observability.banner && !args.no_banner {
        startup::print_banner();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        key_path = %config.key.path.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown).await?;
    Ok(())
}
