//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RIPPLE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Sweep timer configuration.
    #[serde(default)]
    pub sweep: SweepTimersConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for verifying bearer tokens.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Outbound buffer capacity per connection, in frames.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Sweep timer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTimersConfig {
    /// Typing expiry sweep cadence in milliseconds.
    #[serde(default = "default_typing_sweep_interval")]
    pub typing_sweep_interval_ms: u64,

    /// Idle window after which a typing entry expires, in milliseconds.
    #[serde(default = "default_typing_idle")]
    pub typing_idle_ms: u64,

    /// Stale connection reap cadence in milliseconds.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("RIPPLE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("RIPPLE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_auth_secret() -> String {
    std::env::var("RIPPLE_AUTH_SECRET").unwrap_or_default()
}

fn default_true() -> bool {
    true
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_typing_sweep_interval() -> u64 {
    1_000
}

fn default_typing_idle() -> u64 {
    3_000
}

fn default_reap_interval() -> u64 {
    300_000 // 5 minutes
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            sweep: SweepTimersConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for SweepTimersConfig {
    fn default() -> Self {
        Self {
            typing_sweep_interval_ms: default_typing_sweep_interval(),
            typing_idle_ms: default_typing_idle(),
            reap_interval_ms: default_reap_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl SweepTimersConfig {
    /// Typing sweep cadence as a duration.
    #[must_use]
    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_interval_ms)
    }

    /// Typing idle window as a duration.
    #[must_use]
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    /// Reap cadence as a duration.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "ripple.toml",
            "/etc/ripple/ripple.toml",
            "~/.config/ripple/ripple.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.limits.outbound_buffer, 256);
        assert_eq!(config.sweep.typing_idle(), Duration::from_secs(3));
        assert_eq!(config.sweep.reap_interval(), Duration::from_secs(300));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [auth]
            secret = "s3cret"

            [sweep]
            typing_idle_ms = 5000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.sweep.typing_idle(), Duration::from_secs(5));
        // Untouched sections keep their defaults.
        assert_eq!(config.sweep.typing_sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 9000);

        let bad = Config {
            host: "not an address".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }
}
