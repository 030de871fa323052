//! Reseed gateway service: router assembly and the HTTPS listener.

use crate::domain::config::ReseedConfig;
use crate::domain::error::GatewayError;
use crate::handler::{serve_bundle, BundleState};
use crate::middleware::{cleanup_task, AdmissionLimiter, Pipeline};
use crate::ports::Reseeder;
use crate::tls;
use axum::{routing::any, Router};
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Reseed gateway service state
pub struct ReseedService {
    config: ReseedConfig,
    state: BundleState,
    pipeline: Pipeline,
    handle: Handle,
}

impl ReseedService {
    /// Create a new service with a fresh limiter
    pub fn new(config: ReseedConfig, reseeder: Arc<dyn Reseeder>) -> Result<Self, GatewayError> {
        let limiter = Arc::new(AdmissionLimiter::new(config.rate_limit.clone()));
        Self::with_limiter(config, reseeder, limiter)
    }

    /// Create a service sharing an existing limiter
    pub fn with_limiter(
        config: ReseedConfig,
        reseeder: Arc<dyn Reseeder>,
        limiter: Arc<AdmissionLimiter>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let pipeline = Pipeline::from_config(&config, limiter)?;
        let state = BundleState::new(reseeder, &config.bundle.filename);

        Ok(Self {
            config,
            state,
            pipeline,
            handle: Handle::new(),
        })
    }

    /// Router with the pipeline attached to the bundle route only.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.bundle.path, any(serve_bundle))
            .route_layer(self.pipeline.layer())
            .with_state(self.state.clone())
    }

    /// Serve HTTPS until `shutdown` is called or the listener fails.
    pub async fn start(&self) -> Result<(), GatewayError> {
        info!("Starting reseed gateway...");

        let tls_config = tls::rustls_config(&self.config.listener.tls)?;
        let addr = self.config.listen_addr();

        let cleanup = tokio::spawn(cleanup_task(
            self.limiter(),
            self.config.rate_limit.cleanup_interval,
        ));

        info!(
            addr = %addr,
            path = %self.config.bundle.path,
            max_requests = self.config.rate_limit.max_requests,
            "Starting HTTPS server"
        );

        let result = axum_server::bind_rustls(addr, tls_config)
            .handle(self.handle.clone())
            .serve(self.router().into_make_service_with_connect_info::<SocketAddr>())
            .await;

        cleanup.abort();

        match result {
            Ok(()) => {
                info!("Reseed gateway stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "HTTPS server error");
                Err(GatewayError::Bind(format!("{addr}: {e}")))
            }
        }
    }

    /// Trigger graceful shutdown, letting in-flight requests finish within
    /// the configured grace period.
    pub fn shutdown(&self) {
        info!(grace = ?self.config.listener.shutdown_grace, "Shutting down");
        self.handle
            .graceful_shutdown(Some(self.config.listener.shutdown_grace));
    }

    /// Listener handle, e.g. to await the bound address
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Get the shared limiter
    pub fn limiter(&self) -> Arc<AdmissionLimiter> {
        self.pipeline.limiter()
    }
}
