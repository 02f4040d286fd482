//! # Ripple Server
//!
//! Realtime fan-out relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! RIPPLE_AUTH_SECRET=... ripple
//!
//! # Run with custom config
//! ripple  # reads ripple.toml from the usual locations
//!
//! # Run with environment variables
//! RIPPLE_PORT=8080 RIPPLE_HOST=0.0.0.0 RIPPLE_AUTH_SECRET=... ripple
//! ```

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ripple_server::Config::load()?;

    tracing::info!("Starting Ripple relay on {}:{}", config.host, config.port);

    // Initialize metrics
    ripple_server::metrics::init_metrics();

    // Start the server
    ripple_server::run_server(config).await?;

    Ok(())
}
