//! Server configuration for `knobs`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `KNOBS_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use knobs_core::auth::{Credentials, SessionGateConfig};
use knobs_core::session::DEFAULT_IDLE_TIMEOUT;

const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// JSON schema file describing the settings blocks. `None` serves the
    /// built-in demo blocks.
    pub schema_path: Option<String>,
    /// Session login in front of pages and writes.
    pub auth_enabled: bool,
    /// Only writes need a session; pages stay public.
    pub post_only_lockdown: bool,
    /// Session idle timeout; `None` never expires.
    pub session_idle_timeout: Option<Duration>,
    /// UI login credentials.
    pub web_credentials: Option<Credentials>,
    /// Fallback password for block writes while login is disabled.
    pub settings_password: Option<String>,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
    /// `RocksDB` persistent storage.
    RocksDb { path: String },
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, listening on `0.0.0.0`
    /// - `KNOBS_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `KNOBS_STORAGE`: `memory`, `redb`, or `rocksdb` (default: `redb`)
    /// - `KNOBS_STORAGE_PATH`: path for persistent backends (default: `./knobs-data`)
    /// - `KNOBS_LOG_LEVEL`: log filter (default: `info`)
    /// - `KNOBS_SCHEMA`: path to a JSON block schema (optional)
    /// - `KNOBS_AUTH_ENABLED`: require a login session (default: `false`)
    /// - `KNOBS_POST_ONLY_LOCKDOWN`: only writes require a session (default: `false`)
    /// - `KNOBS_SESSION_IDLE_SECS`: idle timeout, `0` disables expiry (default: 36 h)
    /// - `KNOBS_WEB_USER` / `KNOBS_WEB_PASSWORD`: login credentials
    /// - `KNOBS_SETTINGS_PASSWORD`: fallback write password when login is disabled
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables read through
    /// `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Priority: KNOBS_BIND_ADDR > PORT > default 127.0.0.1:8080
        let bind_addr = if let Some(addr) = lookup("KNOBS_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port_str) = lookup("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_path = lookup("KNOBS_STORAGE_PATH").unwrap_or_else(|| "./knobs-data".to_owned());

        let storage_backend = match lookup("KNOBS_STORAGE")
            .unwrap_or_else(|| "redb".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            "rocksdb" => StorageBackendType::RocksDb { path: storage_path },
            _ => StorageBackendType::Redb { path: storage_path },
        };

        let log_level = lookup("KNOBS_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let session_idle_timeout = match lookup("KNOBS_SESSION_IDLE_SECS").and_then(|v| v.parse::<u64>().ok()) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_IDLE_TIMEOUT),
        };

        let web_credentials = match (lookup("KNOBS_WEB_USER"), lookup("KNOBS_WEB_PASSWORD")) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            _ => None,
        };

        Self {
            bind_addr,
            storage_backend,
            log_level,
            schema_path: lookup("KNOBS_SCHEMA").filter(|p| !p.is_empty()),
            auth_enabled: flag(lookup("KNOBS_AUTH_ENABLED"), false),
            post_only_lockdown: flag(lookup("KNOBS_POST_ONLY_LOCKDOWN"), false),
            session_idle_timeout,
            web_credentials,
            settings_password: lookup("KNOBS_SETTINGS_PASSWORD").filter(|p| !p.is_empty()),
        }
    }

    /// Session gate settings derived from this configuration.
    pub fn gate_config(&self) -> SessionGateConfig {
        SessionGateConfig {
            enabled: self.auth_enabled,
            post_only_lockdown: self.post_only_lockdown,
            whitelist: Vec::new(),
            credentials: self.web_credentials.clone(),
            idle_timeout: self.session_idle_timeout,
        }
    }
}
