//! Relay configuration.
//!
//! All settings are env-driven. The route set itself is compiled in; the
//! backend host is the only externally supplied routing parameter.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::blocklist::DEFAULT_RELOAD_INTERVAL;
use crate::proxy::{Route, DEFAULT_DIAL_TIMEOUT};

/// Relay configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Internal host every route forwards to.
    pub backend_host: String,

    /// Address the listeners bind on.
    pub listen_ip: IpAddr,

    /// Path to the blocklist file.
    pub blocklist_file: PathBuf,

    /// Path to the connection log (JSONL).
    pub connection_log: PathBuf,

    /// Interval between blocklist reloads.
    pub blocklist_reload_interval: Duration,

    /// Timeout for backend dials.
    pub dial_timeout: Duration,

    /// Log level (trace, debug, info, warn, error) when RUST_LOG is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let backend_host = std::env::var("NEKO_BACKEND_HOST")
            .context("Missing backend host. Set NEKO_BACKEND_HOST to the internal server address.")?;

        let listen_ip: IpAddr = std::env::var("NEKO_LISTEN_IP")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse()
            .context("NEKO_LISTEN_IP must be an IP address.")?;

        let blocklist_file = std::env::var("NEKO_BLOCKLIST_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/nekoproxy/blocklist.txt"));

        let connection_log = std::env::var("NEKO_CONNECTION_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/log/nekoproxy/connections.jsonl"));

        let reload_secs: u64 = std::env::var("NEKO_BLOCKLIST_RELOAD_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("NEKO_BLOCKLIST_RELOAD_SECS must be an integer (seconds).")?
            .unwrap_or(DEFAULT_RELOAD_INTERVAL.as_secs());

        let dial_secs: u64 = std::env::var("NEKO_DIAL_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("NEKO_DIAL_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(DEFAULT_DIAL_TIMEOUT.as_secs());

        let log_level = std::env::var("NEKO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            backend_host,
            listen_ip,
            blocklist_file,
            connection_log,
            blocklist_reload_interval: Duration::from_secs(reload_secs.max(1)),
            dial_timeout: Duration::from_secs(dial_secs.max(1)),
            log_level,
        })
    }

    /// The fixed route set served by this relay.
    pub fn routes(&self) -> Vec<Route> {
        vec![
            Route::new(8085, &self.backend_host, 8085, "WorldServer"),
            Route::new(3724, &self.backend_host, 3724, "AuthServer"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_cover_both_services() {
        let config = Config {
            backend_host: "192.168.0.85".to_string(),
            listen_ip: "0.0.0.0".parse().unwrap(),
            blocklist_file: PathBuf::from("/etc/nekoproxy/blocklist.txt"),
            connection_log: PathBuf::from("/var/log/nekoproxy/connections.jsonl"),
            blocklist_reload_interval: DEFAULT_RELOAD_INTERVAL,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            log_level: "info".to_string(),
        };

        let routes = config.routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "WorldServer");
        assert_eq!(routes[0].listen_port, 8085);
        assert_eq!(routes[1].name, "AuthServer");
        assert_eq!(routes[1].listen_port, 3724);
        assert!(routes.iter().all(|r| r.backend_host == "192.168.0.85"));
    }
}
