//! Gateway configuration loading.
//!
//! TOML is the sole config source.  Default config path:
//! `/etc/camgate/gateway.toml`, overridable with `GATEWAY_CONFIG`.  A missing
//! file yields the built-in defaults so the gateway can run standalone.
//!
//! # Recognized keys
//! - `[server]` `host`, `port`, `path`, `max_connections`,
//!   `read_timeout_secs`, `write_timeout_secs`, `max_message_size`,
//!   `ping_interval_secs`, `pong_wait_secs`, `shutdown_timeout_secs`,
//!   `client_cleanup_timeout_secs`
//! - `[rate_limit]` `requests_per_second`, `burst`
//! - `[auth]` `token_file` (optional credential seed file)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Config types (validated)
// ---------------------------------------------------------------------------

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// WebSocket upgrade path.
    pub path: String,
    pub max_connections: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Inbound frame cap in bytes; a frame of exactly this size is accepted.
    pub max_message_size: usize,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub shutdown_timeout: Duration,
    pub client_cleanup_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_file: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_owned(),
                port: 8002,
                path: "/ws".to_owned(),
                max_connections: 100,
                read_timeout: Duration::from_secs(60),
                write_timeout: Duration::from_secs(10),
                max_message_size: 1024 * 1024,
                ping_interval: Duration::from_secs(30),
                pong_wait: Duration::from_secs(10),
                shutdown_timeout: Duration::from_secs(30),
                client_cleanup_timeout: Duration::from_secs(10),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: 100,
                burst: 200,
            },
            auth: AuthConfig { token_file: None },
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    server: Option<RawServerConfig>,
    rate_limit: Option<RawRateLimitConfig>,
    auth: Option<RawAuthConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServerConfig {
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    max_connections: Option<usize>,
    read_timeout_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    max_message_size: Option<usize>,
    ping_interval_secs: Option<u64>,
    pong_wait_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
    client_cleanup_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRateLimitConfig {
    requests_per_second: Option<u32>,
    burst: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthConfig {
    token_file: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from `GATEWAY_CONFIG` or the default path; built-in defaults
/// when neither file exists.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    let path = std::env::var("GATEWAY_CONFIG")
        .map_or_else(|_| PathBuf::from("/etc/camgate/gateway.toml"), PathBuf::from);
    if path.exists() {
        load_config_from_path(&path)
    } else {
        Ok(GatewayConfig::default())
    }
}

/// Load config from a specific TOML file.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

/// Load config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = GatewayConfig::default();

    let raw_server = raw.server.unwrap_or_default();
    let server = ServerConfig {
        host: raw_server.host.unwrap_or(defaults.server.host),
        port: raw_server.port.unwrap_or(defaults.server.port),
        path: raw_server.path.unwrap_or(defaults.server.path),
        max_connections: raw_server
            .max_connections
            .unwrap_or(defaults.server.max_connections),
        read_timeout: raw_server
            .read_timeout_secs
            .map_or(defaults.server.read_timeout, Duration::from_secs),
        write_timeout: raw_server
            .write_timeout_secs
            .map_or(defaults.server.write_timeout, Duration::from_secs),
        max_message_size: raw_server
            .max_message_size
            .unwrap_or(defaults.server.max_message_size),
        ping_interval: raw_server
            .ping_interval_secs
            .map_or(defaults.server.ping_interval, Duration::from_secs),
        pong_wait: raw_server
            .pong_wait_secs
            .map_or(defaults.server.pong_wait, Duration::from_secs),
        shutdown_timeout: raw_server
            .shutdown_timeout_secs
            .map_or(defaults.server.shutdown_timeout, Duration::from_secs),
        client_cleanup_timeout: raw_server
            .client_cleanup_timeout_secs
            .map_or(defaults.server.client_cleanup_timeout, Duration::from_secs),
    };

    if server.max_connections == 0 {
        return Err(ConfigError::InvalidValue(
            "server.max_connections must be at least 1".to_owned(),
        ));
    }
    if server.max_message_size == 0 {
        return Err(ConfigError::InvalidValue(
            "server.max_message_size must be at least 1".to_owned(),
        ));
    }
    if !server.path.starts_with('/') {
        return Err(ConfigError::InvalidValue(format!(
            "server.path must start with '/', got '{}'",
            server.path
        )));
    }

    let raw_rate = raw.rate_limit.unwrap_or_default();
    let rate_limit = RateLimitConfig {
        requests_per_second: raw_rate
            .requests_per_second
            .unwrap_or(defaults.rate_limit.requests_per_second),
        burst: raw_rate.burst.unwrap_or(defaults.rate_limit.burst),
    };
    if rate_limit.requests_per_second == 0 {
        return Err(ConfigError::InvalidValue(
            "rate_limit.requests_per_second must be at least 1".to_owned(),
        ));
    }

    let auth = AuthConfig {
        token_file: raw.auth.unwrap_or_default().token_file.map(PathBuf::from),
    };

    Ok(GatewayConfig {
        server,
        rate_limit,
        auth,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
