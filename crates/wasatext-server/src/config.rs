//! Server configuration loaded from environment variables.
//!
//! Every setting has a default, so the server starts with no configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `WASATEXT_HOST` (default `0.0.0.0`) and `WASATEXT_PORT` (default `3000`)
    pub addr: SocketAddr,

    /// Env: `WASATEXT_DB_PATH`
    /// Default: `wasatext.db`
    pub db_path: PathBuf,

    /// Storage budget per request.
    /// Env: `WASATEXT_REQUEST_TIMEOUT_MS`
    /// Default: 5000
    pub request_timeout: Duration,

    /// Env: `WASATEXT_MAX_UPLOAD_BYTES`
    /// Default: 10 MiB
    pub max_upload_bytes: usize,

    /// Prefix for synthetic photo URLs.
    /// Env: `WASATEXT_PHOTO_BASE_URL`
    /// Default: `/photos`
    pub photo_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ([0, 0, 0, 0], 3000).into(),
            db_path: PathBuf::from("wasatext.db"),
            request_timeout: Duration::from_millis(5000),
            max_upload_bytes: 10 * 1024 * 1024,
            photo_base_url: "/photos".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        let host = lookup("WASATEXT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match lookup("WASATEXT_PORT") {
            Some(port) => port.parse()?,
            None => config.addr.port(),
        };
        config.addr = format!("{}:{}", host, port).parse()?;

        if let Some(path) = lookup("WASATEXT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("WASATEXT_REQUEST_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.request_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid WASATEXT_REQUEST_TIMEOUT_MS, using default"),
            }
        }

        if let Some(val) = lookup("WASATEXT_MAX_UPLOAD_BYTES") {
            match val.parse::<usize>() {
                Ok(n) => config.max_upload_bytes = n,
                Err(_) => tracing::warn!(value = %val, "Invalid WASATEXT_MAX_UPLOAD_BYTES, using default"),
            }
        }

        if let Some(base) = lookup("WASATEXT_PHOTO_BASE_URL") {
            config.photo_base_url = base;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.db_path, PathBuf::from("wasatext.db"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.photo_base_url, "/photos");
    }

    #[test]
    fn env_overrides_defaults() {
        let config = load(&[
            ("WASATEXT_HOST", "127.0.0.1"),
            ("WASATEXT_PORT", "8081"),
            ("WASATEXT_REQUEST_TIMEOUT_MS", "250"),
            ("WASATEXT_MAX_UPLOAD_BYTES", "1024"),
        ])
        .unwrap();
        assert_eq!(config.addr, ([127, 0, 0, 1], 8081).into());
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn bad_port_is_an_error_but_bad_timeout_falls_back() {
        assert!(load(&[("WASATEXT_PORT", "http")]).is_err());
        let config = load(&[("WASATEXT_REQUEST_TIMEOUT_MS", "0")]).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
