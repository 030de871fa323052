//! Core types flowing through the admission pipeline.
//!
//! `RequestContext` is created once by the address resolver and carried as a
//! request extension; every later stage reads it and never mutates it.

use axum::{extract::ConnectInfo, http::header::USER_AGENT, http::Request};
use bytes::Bytes;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Resolved client address (post proxy rewrite).
///
/// Opaque on purpose: a forwarded value is taken verbatim without checking
/// that it parses as an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientAddr(String);

impl ClientAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Client address of a direct connection: the peer IP without its port.
    pub fn from_socket(addr: SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity used for quota accounting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey(String);

impl RateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ClientAddr> for RateKey {
    fn from(addr: &ClientAddr) -> Self {
        Self(addr.0.clone())
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request view shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Address observed on the TCP connection
    pub transport_addr: SocketAddr,
    /// Address used for logging and rate limiting
    pub client_addr: ClientAddr,
    /// Declared `User-Agent`, if present and valid UTF-8
    pub user_agent: Option<String>,
    /// Request target path
    pub path: String,
}

impl RequestContext {
    /// Build a context for a request whose client address has not been
    /// rewritten: the transport address is the client address.
    pub fn direct<B>(req: &Request<B>) -> Self {
        let transport_addr = transport_addr(req);
        Self {
            transport_addr,
            client_addr: ClientAddr::from_socket(transport_addr),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            path: req.uri().path().to_string(),
        }
    }

    /// Context attached by the address resolver, or a direct one when the
    /// request never passed through it.
    pub fn of<B>(req: &Request<B>) -> Self {
        req.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| Self::direct(req))
    }

    pub fn rate_key(&self) -> RateKey {
        RateKey::from(&self.client_addr)
    }
}

/// Socket address from axum's `ConnectInfo`, loopback when absent.
pub fn transport_addr<B>(req: &Request<B>) -> SocketAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0)
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
}

/// Opaque token naming the peer a bundle is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAssignment(String);

impl PeerAssignment {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bundle bytes produced for one admitted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle(Bytes);

impl Bundle {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Bundle {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}
