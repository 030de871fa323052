//! # Reseed Gateway
//!
//! Serves the bootstrap bundle over HTTPS.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, `RESEED_CONFIG` file, `RESEED_*` env)
//! 2. Initialize logging
//! 3. Build the file-backed reseeder
//! 4. Start the HTTPS listener and the limiter cleanup task
//! 5. Wait for Ctrl+C, then shut down gracefully

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use reseed_gateway::telemetry::init_logging;
use reseed_gateway::{FileReseeder, ReseedConfig, ReseedService};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let (config, rejected) = ReseedConfig::load().context("failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging).context("failed to initialize logging")?;

    if let Ok(path) = std::env::var("RESEED_CONFIG") {
        info!(path = %path, "Loaded configuration file");
    }
    for err in &rejected {
        warn!(error = %err, "Environment override ignored, keeping configured value");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bundle = %config.bundle.source.display(),
        "Reseed gateway starting"
    );

    let reseeder = Arc::new(FileReseeder::new(config.bundle.source.clone()));
    let service = Arc::new(ReseedService::new(config, reseeder)?);

    let runner = Arc::clone(&service);
    let mut server = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Received shutdown signal");
            service.shutdown();
        }
        result = &mut server => {
            // Listener stopped on its own, e.g. unreadable TLS material
            let result = result.context("listener task failed")?;
            if let Err(e) = &result {
                error!(error = %e, "Reseed gateway failed");
            }
            return Ok(result?);
        }
    }

    // Wait for in-flight requests to drain
    server.await??;
    info!("Reseed gateway stopped");

    Ok(())
}
