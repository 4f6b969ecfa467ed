//! Capture relay server.
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────┐
//!   sender ──TCP/TLS──┼─▶ net listener ─▶ capture tap ─▶ hyper ─▶ router   │
//!                     │                     │  Begin/Data        │ End    │
//!                     │                     ▼                    ▼        │
//!                     │                 correlation table ◀── claim       │
//!                     │                     │                             │
//!                     │                     ▼                             │
//!   viewer ◀──ws──────┼───────────────── hub (namespace topics)           │
//!                     └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use capture_relay::config::{load_config, RelayConfig};
use capture_relay::lifecycle::signals;
use capture_relay::observability::{logging, metrics};
use capture_relay::{CaptureServer, Shutdown};

#[derive(Parser)]
#[command(name = "capture-relay")]
#[command(about = "Capture raw HTTP traffic and stream it to live viewers", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "CAPTURE_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("capture-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.tls.is_some(),
        path_prefix = %config.capture.path_prefix,
        entry_ttl_secs = config.capture.entry_ttl_secs,
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

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    CaptureServer::new(config).run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
