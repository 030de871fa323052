//! Gateway configuration with validation.
//!
//! Loaded in three steps: defaults, an optional JSON file named by
//! `RESEED_CONFIG`, then `RESEED_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReseedConfig {
    /// HTTPS listener
    pub listener: ListenerConfig,
    /// Served bundle
    pub bundle: BundleConfig,
    /// Client identification
    pub client: ClientConfig,
    /// Per-client admission quota
    pub rate_limit: RateLimitConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl ReseedConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests cannot be 0".into(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
        }

        if self.rate_limit.max_clients == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_clients cannot be 0".into(),
            ));
        }

        if !self.bundle.path.starts_with('/') {
            return Err(ConfigError::InvalidBundle(format!(
                "path must start with '/': {}",
                self.bundle.path
            )));
        }

        if self.bundle.filename.is_empty()
            || !self
                .bundle
                .filename
                .bytes()
                .all(|b| b.is_ascii_graphic() && b != b'"' && b != b';')
        {
            return Err(ConfigError::InvalidBundle(format!(
                "filename is not a plain token: {:?}",
                self.bundle.filename
            )));
        }

        if self.client.expected_agent.is_empty() {
            return Err(ConfigError::Invalid("expected_agent cannot be empty".into()));
        }

        if self.client.forwarded_header.is_empty() {
            return Err(ConfigError::Invalid(
                "forwarded_header cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Load configuration from `RESEED_CONFIG` (if set) and the environment.
    ///
    /// Invalid environment overrides are skipped and returned alongside the
    /// config, so they can be reported once logging is up.
    pub fn load() -> Result<(Self, Vec<ConfigError>), ConfigError> {
        let mut config = match env::var("RESEED_CONFIG") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };

        let rejected = config.apply_env();
        config.validate()?;
        Ok((config, rejected))
    }

    /// Read a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))
    }

    /// Override fields from `RESEED_*` environment variables.
    pub fn apply_env(&mut self) -> Vec<ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Override fields from `RESEED_*` values supplied by `lookup`.
    /// Unparseable values leave the field unchanged and are returned.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();
        let mut reject = |key: &'static str, value: String| {
            rejected.push(ConfigError::InvalidEnv { key, value })
        };

        if let Some(host) = lookup("RESEED_HOST") {
            match host.parse() {
                Ok(h) => self.listener.host = h,
                Err(_) => reject("RESEED_HOST", host),
            }
        }
        if let Some(port) = lookup("RESEED_PORT") {
            match port.parse() {
                Ok(p) => self.listener.port = p,
                Err(_) => reject("RESEED_PORT", port),
            }
        }
        if let Some(cert) = lookup("RESEED_TLS_CERT") {
            self.listener.tls.cert_path = PathBuf::from(cert);
        }
        if let Some(key) = lookup("RESEED_TLS_KEY") {
            self.listener.tls.key_path = PathBuf::from(key);
        }
        if let Some(version) = lookup("RESEED_TLS_MIN_VERSION") {
            match TlsVersion::parse(&version) {
                Some(v) => self.listener.tls.min_version = v,
                None => reject("RESEED_TLS_MIN_VERSION", version),
            }
        }
        if let Some(source) = lookup("RESEED_BUNDLE_FILE") {
            self.bundle.source = PathBuf::from(source);
        }
        if let Some(agent) = lookup("RESEED_AGENT") {
            self.client.expected_agent = agent;
        }
        if let Some(limit) = lookup("RESEED_RATE_LIMIT") {
            match limit.parse() {
                Ok(l) => self.rate_limit.max_requests = l,
                Err(_) => reject("RESEED_RATE_LIMIT", limit),
            }
        }
        if let Some(max) = lookup("RESEED_MAX_CLIENTS") {
            match max.parse() {
                Ok(m) => self.rate_limit.max_clients = m,
                Err(_) => reject("RESEED_MAX_CLIENTS", max),
            }
        }
        if let Some(level) = lookup("RESEED_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("RESEED_JSON_LOGS") {
            self.logging.json = json.eq_ignore_ascii_case("true") || json == "1";
        }

        rejected
    }

    /// Get listener bind address
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listener.host, self.listener.port)
    }
}

/// HTTPS listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8443)
    pub port: u16,
    /// Certificate material and protocol floor
    pub tls: TlsConfig,
    /// How long in-flight requests may run after shutdown is requested
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8443,
            tls: TlsConfig::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to PEM certificate chain
    pub cert_path: PathBuf,
    /// Path to PEM private key
    pub key_path: PathBuf,
    /// Lowest protocol version accepted
    pub min_version: TlsVersion,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            min_version: TlsVersion::Tls12,
        }
    }
}

/// Minimum TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

impl TlsVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().trim_start_matches("tls").trim_start_matches('v') {
            "1.2" | "12" => Some(TlsVersion::Tls12),
            "1.3" | "13" => Some(TlsVersion::Tls13),
            _ => None,
        }
    }
}

/// Bundle endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// The single routable path
    pub path: String,
    /// Filename advertised in `Content-Disposition`
    pub filename: String,
    /// File read by the file reseeder on every admitted request
    pub source: PathBuf,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path: "/i2pseeds.su3".to_string(),
            filename: "i2pseeds.su3".to_string(),
            source: PathBuf::from("i2pseeds.su3"),
        }
    }
}

/// Client identification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Exact `User-Agent` value clients must send
    pub expected_agent: String,
    /// Header set by the fronting proxy; its first value is trusted as-is
    pub forwarded_header: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            expected_agent: "Wget/1.11.4".to_string(),
            forwarded_header: "X-Forwarded-For".to_string(),
        }
    }
}

/// Admission quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window
    pub max_requests: u32,
    /// Rolling window length, measured from the first request in it
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Maximum distinct clients tracked at once
    pub max_clients: usize,
    /// Interval of the expired-entry purge
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window: Duration::from_secs(3600),
            max_clients: 10_000,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid bundle path or filename
    #[error("invalid bundle settings: {0}")]
    InvalidBundle(String),
    /// Configuration file could not be read or parsed
    #[error("cannot read configuration: {0}")]
    Read(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Environment override that could not be parsed
    #[error("ignoring invalid {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() > 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.trim().parse::<u64>().map_err(|_| "invalid minutes")?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("duration too large")
        } else if let Some(hours) = s.strip_suffix('h') {
            let hours = hours.trim().parse::<u64>().map_err(|_| "invalid hours")?;
            hours
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or("duration too large")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
