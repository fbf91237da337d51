use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read from `TETHER_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub debug: bool,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source. Unset
    /// or empty variables take their default; malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("TETHER_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("TETHER_PORT is not a port: {raw}"))?,
            None => 3000,
        };
        let debug = match get("TETHER_DEBUG") {
            Some(raw) => parse_bool(&raw).with_context(|| format!("TETHER_DEBUG is not a boolean: {raw}"))?,
            None => false,
        };

        Ok(Self {
            host: get("TETHER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("TETHER_DB_PATH").unwrap_or_else(|| "tether.db".into()).into(),
            debug,
            request_timeout: secs(get("TETHER_REQUEST_TIMEOUT_SECS"), "TETHER_REQUEST_TIMEOUT_SECS")?,
            shutdown_timeout: secs(get("TETHER_SHUTDOWN_TIMEOUT_SECS"), "TETHER_SHUTDOWN_TIMEOUT_SECS")?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> String {
        let level = if self.debug { "debug" } else { "info" };
        format!("tether={level},tether_api={level},tether_db={level},tower_http={level}")
    }
}

fn secs(raw: Option<String>, key: &str) -> Result<Duration> {
    match raw {
        Some(raw) => {
            let n: u64 = raw.parse().with_context(|| format!("{key} is not a number of seconds: {raw}"))?;
            Ok(Duration::from_secs(n))
        }
        None => Ok(Duration::from_secs(5)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("tether.db"));
        assert!(!cfg.debug);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(cfg.addr().unwrap().port(), 3000);
        assert!(cfg.log_filter().starts_with("tether=info"));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("TETHER_HOST", "127.0.0.1"),
            ("TETHER_PORT", "8080"),
            ("TETHER_DB_PATH", "/tmp/chat.db"),
            ("TETHER_DEBUG", "true"),
            ("TETHER_REQUEST_TIMEOUT_SECS", "30"),
            ("TETHER_SHUTDOWN_TIMEOUT_SECS", " 2 "),
        ])
        .unwrap();
        assert_eq!(cfg.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/chat.db"));
        assert!(cfg.debug);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(2));
        assert!(cfg.log_filter().contains("tether_db=debug"));
    }

    #[test]
    fn malformed_values_fail() {
        assert!(config(&[("TETHER_PORT", "http")]).is_err());
        assert!(config(&[("TETHER_PORT", "70000")]).is_err());
        assert!(config(&[("TETHER_DEBUG", "maybe")]).is_err());
        assert!(config(&[("TETHER_REQUEST_TIMEOUT_SECS", "-1")]).is_err());
    }
}
