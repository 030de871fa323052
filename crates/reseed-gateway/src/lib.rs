// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Reseed Gateway - HTTPS endpoint serving a single bootstrap bundle.
//!
//! Every request for the bundle path passes through a fixed admission
//! pipeline before a bundle is produced.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    RESEED GATEWAY                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │   TLS Listener (rustls, ConnectInfo<SocketAddr>)             │
//! │          │                                                   │
//! │   ┌──────┴───────────────────────────────────────────┐       │
//! │   │  ForwardedFor → AccessLog → VerifyAgent → RateLimit │    │
//! │   └──────┬───────────────────────────────────────────┘       │
//! │          │                                                   │
//! │   Bundle Handler ──► Reseeder::peer ──► Reseeder::bundle_for │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any other path returns 404 without entering the pipeline.
//!
//! # Usage
//!
//! ```ignore
//! use reseed_gateway::{FileReseeder, ReseedConfig, ReseedService};
//!
//! let config = ReseedConfig::load()?;
//! let reseeder = Arc::new(FileReseeder::new(&config.bundle.source));
//! let service = ReseedService::new(config, reseeder)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod handler;
pub mod middleware;
pub mod ports;
pub mod service;
pub mod telemetry;
pub mod tls;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::FileReseeder;
pub use domain::config::ReseedConfig;
pub use domain::error::{GatewayError, Rejection, ReseedError};
pub use middleware::{AdmissionLimiter, Pipeline};
pub use ports::{Clock, Reseeder, SystemClock};
pub use service::ReseedService;
