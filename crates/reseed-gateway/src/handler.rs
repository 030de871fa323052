//! Bundle handler: the terminal stage of the pipeline.

use crate::domain::error::Rejection;
use crate::domain::types::RequestContext;
use crate::ports::Reseeder;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue,
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handler state
#[derive(Clone)]
pub struct BundleState {
    pub reseeder: Arc<dyn Reseeder>,
    pub content_disposition: HeaderValue,
}

impl BundleState {
    pub fn new(reseeder: Arc<dyn Reseeder>, filename: &str) -> Self {
        let content_disposition = HeaderValue::try_from(format!("attachment; filename={filename}"))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        Self {
            reseeder,
            content_disposition,
        }
    }
}

/// Ask the reseeder for a peer, then for that peer's bundle, and send it as
/// a download. A failure at either step ends the request with a 500.
pub async fn serve_bundle(State(state): State<BundleState>, req: Request) -> Response {
    let ctx = RequestContext::of(&req);

    let peer = match state.reseeder.peer(&ctx).await {
        Ok(peer) => peer,
        Err(e) => {
            warn!(client = %ctx.client_addr, error = %e, "Unable to select peer");
            return Rejection::BackendFailure.into_response();
        }
    };

    let bundle = match state.reseeder.bundle_for(&peer).await {
        Ok(bundle) => bundle,
        Err(e) => {
            warn!(client = %ctx.client_addr, peer = %peer, error = %e, "Unable to build bundle");
            return Rejection::BackendFailure.into_response();
        }
    };

    debug!(client = %ctx.client_addr, size = bundle.len(), "Serving bundle");

    let len = bundle.len();
    let mut response = Response::new(Body::from(bundle.into_bytes()));
    let headers = response.headers_mut();
    headers.insert(CONTENT_DISPOSITION, state.content_disposition.clone());
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    response
}
