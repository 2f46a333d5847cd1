//! Configuration management for the Marquee API server
//!
//! Settings come from an optional `config.toml` layered under environment
//! variables (`MARQUEE_SERVER__PORT=8080`, `MARQUEE_LIMITER__BURST=8`, ...).
//! Everything is read once at startup and never mutated afterwards.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

/// Config file locations, later entries override earlier ones.
const CONFIG_PATHS: [&str; 2] = [
    "marquee-api/config", // Container layout: /app/marquee-api/config.toml
    "config",             // Local development: ./config.toml
];

const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// Longest accepted maintenance period (30 days)
const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// HTTP listener and process settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment reported by the health check
    #[serde(default = "default_env")]
    pub env: String,

    /// Upper bound on draining in-flight requests at shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    /// Exact IPs, CIDR ranges, or `"*"` for any peer. Empty trusts nobody.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// Rate limiter settings, immutable after construction
#[derive(Debug, Deserialize, Clone)]
pub struct LimiterConfig {
    #[serde(default = "default_limiter_enabled")]
    pub enabled: bool,

    /// Sustained permits refilled per second for each client
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Bucket capacity, the largest burst admitted after idling
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Period of the idle-client eviction sweep
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Idle time after which a client is evicted. Falls back to the
    /// cleanup interval when unset.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Period of the client map rebuild
    #[serde(default = "default_rebuild_interval_secs")]
    pub rebuild_interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_env() -> String {
    "development".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_limiter_enabled() -> bool {
    true
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_cleanup_interval_secs() -> u64 {
    3 * 60
}

fn default_rebuild_interval_secs() -> u64 {
    6 * 60 * 60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            env: default_env(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_limiter_enabled(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            idle_timeout_secs: None,
            rebuild_interval_secs: default_rebuild_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        for path in CONFIG_PATHS {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            Environment::with_prefix("MARQUEE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::finish(builder)
    }

    /// Parse configuration from TOML text alone, without environment overrides
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::finish(Config::builder().add_source(File::from_str(contents, FileFormat::Toml)))
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings = builder.build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("port cannot be 0".into()));
        }

        if !ENVIRONMENTS.contains(&self.server.env.as_str()) {
            return Err(ConfigError::Message(format!(
                "env must be one of {:?}, got '{}'",
                ENVIRONMENTS, self.server.env
            )));
        }

        let limiter = &self.limiter;
        if !(limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0) {
            return Err(ConfigError::Message(
                "limiter.requests_per_second must be greater than 0".into(),
            ));
        }

        if limiter.burst == 0 {
            return Err(ConfigError::Message(
                "limiter.burst must be at least 1".into(),
            ));
        }

        // Sweep periods feed tokio intervals, which panic on zero and overflow
        // the clock when too large, so they are bounded even when limiting is off.
        for (name, secs) in [
            ("cleanup_interval_secs", limiter.cleanup_interval_secs),
            ("rebuild_interval_secs", limiter.rebuild_interval_secs),
        ] {
            if !(1..=MAX_INTERVAL_SECS).contains(&secs) {
                return Err(ConfigError::Message(format!(
                    "limiter.{} must be between 1 and {}, got {}",
                    name, MAX_INTERVAL_SECS, secs
                )));
            }
        }

        Ok(())
    }
}

impl ServerSettings {
    /// Get bind address and port as a socket address string
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl LimiterConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(self.cleanup_interval_secs))
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.server.listen_addr(), "0.0.0.0:4000");
        assert_eq!(config.server.env, "development");
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 2.0);
        assert_eq!(config.limiter.burst, 4);
        assert_eq!(config.limiter.cleanup_interval(), Duration::from_secs(180));
        assert_eq!(config.limiter.rebuild_interval(), Duration::from_secs(21_600));
    }

    #[test]
    fn idle_timeout_defaults_to_cleanup_interval() {
        let config = AppConfig::from_toml(
            r#"
            [limiter]
            cleanup_interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.limiter.idle_timeout(), Duration::from_secs(60));

        let config = AppConfig::from_toml(
            r#"
            [limiter]
            cleanup_interval_secs = 60
            idle_timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.limiter.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(config.limiter.idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn parses_full_file() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            bind_address = "127.0.0.1"
            port = 8080
            env = "staging"
            trusted_proxies = ["10.0.0.0/8"]

            [limiter]
            enabled = false
            requests_per_second = 0.5
            burst = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_addr(), "127.0.0.1:8080");
        assert_eq!(config.server.trusted_proxies, vec!["10.0.0.0/8".to_string()]);
        assert!(!config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 0.5);
        assert_eq!(config.limiter.burst, 10);
    }

    #[test]
    fn accepts_the_longest_interval() {
        let config = AppConfig::from_toml(
            r#"
            [limiter]
            cleanup_interval_secs = 2592000
            rebuild_interval_secs = 2592000
            "#,
        )
        .unwrap();
        assert_eq!(config.limiter.rebuild_interval(), Duration::from_secs(MAX_INTERVAL_SECS));
    }

    #[test]
    fn toml_text_ignores_environment_overrides() {
        // SAFETY: no other test reads or writes the process environment.
        unsafe { std::env::set_var("MARQUEE_LIMITER__BURST", "0") };
        let config = AppConfig::from_toml("[limiter]\nrequests_per_second = 1.0");
        unsafe { std::env::remove_var("MARQUEE_LIMITER__BURST") };

        assert_eq!(config.unwrap().limiter.burst, 4);
    }

    #[test]
    fn rejects_invalid_values() {
        for contents in [
            "[server]\nport = 0",
            "[server]\nenv = \"qa\"",
            "[limiter]\nrequests_per_second = 0.0",
            "[limiter]\nrequests_per_second = -1.0",
            "[limiter]\nburst = 0",
            "[limiter]\ncleanup_interval_secs = 0",
            "[limiter]\nrebuild_interval_secs = 0",
            "[limiter]\nrebuild_interval_secs = 9223372036854775807",
            "[limiter]\ncleanup_interval_secs = 2592001",
        ] {
            assert!(
                AppConfig::from_toml(contents).is_err(),
                "accepted: {contents}"
            );
        }
    }
}
