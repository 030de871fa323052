//! Reseeder serving a bundle file from disk.
//!
//! The file is read again on every call so an external process can replace
//! it while the gateway is running.

use crate::domain::error::ReseedError;
use crate::domain::types::{Bundle, PeerAssignment, RequestContext};
use crate::ports::Reseeder;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

/// File-backed reseeder
#[derive(Debug, Clone)]
pub struct FileReseeder {
    path: PathBuf,
}

impl FileReseeder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Peer token for a client: hex SHA-256 of its resolved address.
pub fn peer_token(ctx: &RequestContext) -> PeerAssignment {
    let digest = Sha256::digest(ctx.client_addr.as_str().as_bytes());
    PeerAssignment::new(hex::encode(digest))
}

#[async_trait]
impl Reseeder for FileReseeder {
    async fn peer(&self, ctx: &RequestContext) -> Result<PeerAssignment, ReseedError> {
        Ok(peer_token(ctx))
    }

    async fn bundle_for(&self, peer: &PeerAssignment) -> Result<Bundle, ReseedError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ReseedError::BundleUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        debug!(peer = %peer, size = bytes.len(), "Read bundle file");
        Ok(Bundle::from(bytes))
    }
}
