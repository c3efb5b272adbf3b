use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Public mode bypasses the client whitelist gate entirely.
    #[serde(default)]
    pub public: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    /// Also listen on an IPv6 socket.
    #[serde(default)]
    pub ipv6: bool,

    #[serde(default = "default_listen_ipv6")]
    pub listen_ipv6: String,

    /// Serve IPv6 only; the IPv4 listener is skipped.
    #[serde(default)]
    pub ipv6_only: bool,

    /// Interval handed to clients, in seconds.
    #[serde(default = "default_announce_interval")]
    pub announce_interval: u32,

    /// Floor under client re-announces; earlier interval-less announces are
    /// rejected.
    #[serde(default = "default_announce_interval_min")]
    pub announce_interval_min: u32,

    #[serde(default = "default_reaper_interval")]
    pub reaper_interval: u32,

    #[serde(default = "default_batch_update_interval")]
    pub batch_update_interval: u32,

    /// Hard cap on peers returned per announce.
    #[serde(default = "default_max_peers")]
    pub max_peers: u32,

    /// Register unknown info hashes on first announce instead of rejecting.
    #[serde(default)]
    pub auto_register: bool,

    /// Accept RFC1918/loopback peer addresses (lab setups).
    #[serde(default)]
    pub allow_non_routable: bool,

    /// Trust X-Forwarded-For from a fronting proxy.
    #[serde(default)]
    pub trust_forwarded: bool,

    /// Seconds a leecher may stay incomplete before being flagged
    /// hit-and-run.
    #[serde(default = "default_hnr_threshold")]
    pub hnr_threshold: u32,

    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "http".
    #[serde(default = "default_store_driver")]
    pub driver: String,

    /// Backend API base URL for the http driver.
    #[serde(default)]
    pub endpoint: String,

    /// Shared key for the backend API and the admin surface.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub console: bool,
}

fn default_listen() -> String {
    "0.0.0.0:34000".to_string()
}

fn default_listen_ipv6() -> String {
    "[::]:34000".to_string()
}

fn default_announce_interval() -> u32 {
    1800
}

fn default_announce_interval_min() -> u32 {
    900
}

fn default_reaper_interval() -> u32 {
    90
}

fn default_batch_update_interval() -> u32 {
    30
}

fn default_max_peers() -> u32 {
    30
}

fn default_hnr_threshold() -> u32 {
    1_209_600 // 14 days
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_store_driver() -> String {
    "memory".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty tracker config deserializes")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty store config deserializes")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty logging config deserializes")
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address '{}'", self.tracker.listen))?;

        if self.tracker.ipv6 || self.tracker.ipv6_only {
            self.tracker
                .listen_ipv6
                .parse::<SocketAddr>()
                .with_context(|| {
                    format!("Invalid IPv6 listen address '{}'", self.tracker.listen_ipv6)
                })?;
        }

        if self.tracker.announce_interval == 0 {
            bail!("announce_interval must be greater than 0");
        }

        if self.tracker.announce_interval_min > self.tracker.announce_interval {
            bail!(
                "announce_interval_min ({}) must not exceed announce_interval ({})",
                self.tracker.announce_interval_min,
                self.tracker.announce_interval
            );
        }

        if self.tracker.reaper_interval == 0 {
            bail!("reaper_interval must be greater than 0");
        }

        // Peers live for two announce intervals; reaping more rarely than
        // that only delays eviction, reaping at 0 TTL would empty swarms
        if self.tracker.reaper_interval >= self.tracker.announce_interval * 2 {
            bail!(
                "reaper_interval ({}) must be below the peer TTL ({})",
                self.tracker.reaper_interval,
                self.tracker.announce_interval * 2
            );
        }

        if self.tracker.batch_update_interval == 0 {
            bail!("batch_update_interval must be greater than 0");
        }

        if self.tracker.max_peers == 0 {
            bail!("max_peers must be greater than 0");
        }

        if self.tracker.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        match self.store.driver.as_str() {
            "memory" => {}
            "http" => {
                if self.store.endpoint.is_empty() {
                    bail!("store.endpoint is required for the http driver");
                }
            }
            other => bail!("Unknown store driver '{}'. Must be one of: memory, http", other),
        }

        if self.geo.enabled && self.geo.path.as_os_str().is_empty() {
            bail!("geo.path is required when geo.enabled is set");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();

        assert_eq!(config.tracker.announce_interval, 1800);
        assert_eq!(config.tracker.announce_interval_min, 900);
        assert_eq!(config.tracker.reaper_interval, 90);
        assert_eq!(config.tracker.batch_update_interval, 30);
        assert_eq!(config.tracker.max_peers, 30);
        assert!(!config.tracker.public);
        assert!(!config.tracker.auto_register);
        assert_eq!(config.store.driver, "memory");
    }

    #[test]
    fn test_parse_overrides() {
        let config: Config = toml::from_str(
            r#"
            [tracker]
            public = true
            listen = "127.0.0.1:7000"
            announce_interval = 600
            announce_interval_min = 300
            max_peers = 50

            [store]
            driver = "http"
            endpoint = "http://backend:8000/api"
            api_key = "secret"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert!(config.tracker.public);
        assert_eq!(config.tracker.announce_interval, 600);
        assert_eq!(config.tracker.max_peers, 50);
        assert_eq!(config.store.driver, "http");
    }

    #[test]
    fn test_min_interval_must_not_exceed_interval() {
        let config: Config = toml::from_str(
            r#"
            [tracker]
            announce_interval = 600
            announce_interval_min = 700
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_driver_requires_endpoint() {
        let config: Config = toml::from_str(
            r#"
            [store]
            driver = "http"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let config: Config = toml::from_str(
            r#"
            [store]
            driver = "redis"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let config: Config = toml::from_str(
            r#"
            [tracker]
            listen = "not-an-address"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
