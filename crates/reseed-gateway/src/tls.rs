//! TLS material loading and server configuration.
//!
//! Certificates and keys are PEM files read once at startup. The protocol
//! floor comes from configuration; rustls never negotiates anything below
//! TLS 1.2.

use crate::domain::config::{TlsConfig, TlsVersion};
use crate::domain::error::GatewayError;
use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Protocol versions accepted for a configured minimum.
pub fn protocol_versions(min: TlsVersion) -> &'static [&'static SupportedProtocolVersion] {
    match min {
        TlsVersion::Tls12 => rustls::ALL_VERSIONS,
        TlsVersion::Tls13 => TLS13_ONLY,
    }
}

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, GatewayError> {
    let file = File::open(path)
        .map_err(|e| GatewayError::Tls(format!("{}: {}", path.display(), e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("{}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(GatewayError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

/// Read the first private key from a PEM file.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, GatewayError> {
    let file = File::open(path)
        .map_err(|e| GatewayError::Tls(format!("{}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| GatewayError::Tls(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| GatewayError::Tls(format!("{}: no private key found", path.display())))
}

/// Build the rustls server configuration.
pub fn server_config(config: &TlsConfig) -> Result<ServerConfig, GatewayError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let mut server = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(protocol_versions(config.min_version))
    .map_err(|e| GatewayError::Tls(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| GatewayError::Tls(e.to_string()))?;

    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(server)
}

/// Listener TLS configuration for axum-server.
pub fn rustls_config(config: &TlsConfig) -> Result<RustlsConfig, GatewayError> {
    let server = server_config(config)?;
    info!(
        cert = %config.cert_path.display(),
        min_version = ?config.min_version,
        "Loaded TLS certificate"
    );
    Ok(RustlsConfig::from_config(Arc::new(server)))
}
