//! Configuration management for price-stream.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::session::MAX_SESSION_TIMEOUT;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session lifetime configuration.
    pub sessions: SessionsSection,
    /// Price publisher configuration.
    pub publisher: PublisherSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
    /// Seconds between keep-alive pings on each connection; 0 disables them.
    pub keep_alive_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown: true,
            keep_alive_secs: 120,
        }
    }
}

/// Session lifetime section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Lifetime of a session that did not ask for its own.
    pub timeout_secs: u64,
    /// How often expired sessions are swept.
    pub sweep_interval_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Price publisher section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSection {
    /// Delay between price updates on one session.
    pub interval_ms: u64,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    ///
    /// Unparsable numeric values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("PRICE_STREAM_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("PRICE_STREAM_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(secs) = var("PRICE_STREAM_SESSION_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.sessions.timeout_secs = secs;
        }

        if let Some(secs) = var("PRICE_STREAM_SWEEP_INTERVAL").and_then(|v| v.parse().ok()) {
            self.sessions.sweep_interval_secs = secs;
        }

        if let Some(ms) = var("PRICE_STREAM_PUBLISH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.publisher.interval_ms = ms;
        }

        if let Some(secs) = var("PRICE_STREAM_KEEP_ALIVE").and_then(|v| v.parse().ok()) {
            self.server.keep_alive_secs = secs;
        }

        if let Some(level) = var("PRICE_STREAM_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(secs) = args.session_timeout {
            self.sessions.timeout_secs = secs;
        }

        if let Some(secs) = args.sweep_interval {
            self.sessions.sweep_interval_secs = secs;
        }

        if let Some(ms) = args.publish_interval_ms {
            self.publisher.interval_ms = ms;
        }

        if let Some(secs) = args.keep_alive {
            self.server.keep_alive_secs = secs;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Validate and convert to the runtime server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        // A zero session timeout is legal: such sessions expire at the next sweep.
        if self.sessions.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval("sessions.sweep_interval_secs"));
        }
        if self.publisher.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("publisher.interval_ms"));
        }

        let session_timeout = bounded(
            "sessions.timeout_secs",
            Duration::from_secs(self.sessions.timeout_secs),
        )?;
        let sweep_interval = bounded(
            "sessions.sweep_interval_secs",
            Duration::from_secs(self.sessions.sweep_interval_secs),
        )?;
        let publish_interval = bounded(
            "publisher.interval_ms",
            Duration::from_millis(self.publisher.interval_ms),
        )?;
        let keep_alive = match self.server.keep_alive_secs {
            0 => None,
            secs => Some(bounded(
                "server.keep_alive_secs",
                Duration::from_secs(secs),
            )?),
        };

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port)
            .with_session_timeout(session_timeout)
            .with_sweep_interval(sweep_interval)
            .with_publish_interval(publish_interval)
            .with_keep_alive(keep_alive);

        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn bounded(field: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value > MAX_SESSION_TIMEOUT {
        return Err(ConfigError::TooLarge(field));
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A periodic interval was zero.
    InvalidInterval(&'static str),
    /// A duration exceeded one year.
    TooLarge(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidInterval(field) => write!(f, "{} must be greater than zero", field),
            Self::TooLarge(field) => write!(f, "{} must not exceed one year", field),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::PriceStreamError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio_test::{assert_err, assert_ok};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.sessions.timeout_secs, 60);
        assert_eq!(config.sessions.sweep_interval_secs, 60);
        assert_eq!(config.publisher.interval_ms, 2000);
        assert_eq!(config.server.keep_alive_secs, 120);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "server": {
                "host": "0.0.0.0",
                "port": 8080
            },
            "sessions": {
                "timeout_secs": 300,
                "sweep_interval_secs": 10
            },
            "publisher": {
                "interval_ms": 500
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sessions.timeout_secs, 300);
        assert_eq!(config.sessions.sweep_interval_secs, 10);
        assert_eq!(config.publisher.interval_ms, 500);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "server": {
                "port": 9000
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1"); // Default
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sessions.timeout_secs, 60);
    }

    #[test]
    fn test_config_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = assert_err!(Config::from_file(file.path()));
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = assert_err!(Config::from_file(&dir.path().join("absent.json")));
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[
            ("PRICE_STREAM_HOST", "10.0.0.1"),
            ("PRICE_STREAM_PORT", "4000"),
            ("PRICE_STREAM_SESSION_TIMEOUT", "120"),
            ("PRICE_STREAM_SWEEP_INTERVAL", "15"),
            ("PRICE_STREAM_PUBLISH_INTERVAL_MS", "100"),
            ("PRICE_STREAM_KEEP_ALIVE", "30"),
            ("PRICE_STREAM_LOG_LEVEL", "debug"),
            ("RUST_LOG", "trace"),
        ]));

        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.sessions.timeout_secs, 120);
        assert_eq!(config.sessions.sweep_interval_secs, 15);
        assert_eq!(config.publisher.interval_ms, 100);
        assert_eq!(config.server.keep_alive_secs, 30);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_apply_env_falls_back_to_rust_log() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[("RUST_LOG", "warn")]));
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_apply_env_ignores_garbage_numbers() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[
            ("PRICE_STREAM_PORT", "eighty"),
            ("PRICE_STREAM_SESSION_TIMEOUT", "-1"),
        ]));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.sessions.timeout_secs, 60);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            port: Some(5000),
            session_timeout: Some(10),
            publish_interval_ms: Some(750),
            keep_alive: Some(0),
            ..Args::default()
        };

        config.apply_args(&args);
        assert_eq!(config.server.keep_alive_secs, 0);

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.sessions.timeout_secs, 10);
        assert_eq!(config.sessions.sweep_interval_secs, 60);
        assert_eq!(config.publisher.interval_ms, 750);
    }

    #[test]
    fn test_args_override_env() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[("PRICE_STREAM_PORT", "4000")]));
        config.apply_args(&Args {
            port: Some(5000),
            ..Args::default()
        });
        assert_eq!(config.server.port, 5000);

        // Unset arguments leave earlier layers alone.
        let mut config = Config::default();
        config.apply_env_from(env_of(&[("PRICE_STREAM_PORT", "4000")]));
        config.apply_args(&Args::default());
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_load_from_file_and_args() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"sessions": {"timeout_secs": 90}}"#)
            .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            sweep_interval: Some(3),
            ..Args::default()
        };

        let config = assert_ok!(Config::load(&args));
        assert_eq!(config.sessions.timeout_secs, 90);
        assert_eq!(config.sessions.sweep_interval_secs, 3);
    }

    #[test]
    fn test_to_server_config() {
        let mut config = Config::default();
        config.sessions.timeout_secs = 0;
        config.server.graceful_shutdown = false;

        let server_config = assert_ok!(config.to_server_config());
        assert_eq!(server_config.host, "127.0.0.1");
        assert_eq!(server_config.port, 3000);
        assert_eq!(server_config.session_timeout, Duration::ZERO);
        assert_eq!(server_config.sweep_interval, Duration::from_secs(60));
        assert_eq!(server_config.publish_interval, Duration::from_secs(2));
        assert_eq!(server_config.keep_alive, Some(Duration::from_secs(120)));
        assert!(!server_config.graceful_shutdown);
    }

    #[test]
    fn test_zero_keep_alive_disables_pings() {
        let mut config = Config::default();
        config.server.keep_alive_secs = 0;

        let server_config = assert_ok!(config.to_server_config());
        assert_eq!(server_config.keep_alive, None);
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let mut config = Config::default();
        config.sessions.timeout_secs = u64::MAX;
        let err = assert_err!(config.to_server_config());
        assert_eq!(
            err.to_string(),
            "sessions.timeout_secs must not exceed one year"
        );

        let mut config = Config::default();
        config.sessions.sweep_interval_secs = u64::MAX;
        assert!(matches!(
            config.to_server_config(),
            Err(ConfigError::TooLarge("sessions.sweep_interval_secs"))
        ));

        let mut config = Config::default();
        config.publisher.interval_ms = u64::MAX;
        assert!(matches!(
            config.to_server_config(),
            Err(ConfigError::TooLarge("publisher.interval_ms"))
        ));

        let mut config = Config::default();
        config.server.keep_alive_secs = u64::MAX;
        assert!(matches!(
            config.to_server_config(),
            Err(ConfigError::TooLarge("server.keep_alive_secs"))
        ));
    }

    #[test]
    fn test_one_year_timeout_accepted() {
        let mut config = Config::default();
        config.sessions.timeout_secs = MAX_SESSION_TIMEOUT.as_secs();

        let server_config = assert_ok!(config.to_server_config());
        assert_eq!(server_config.session_timeout, MAX_SESSION_TIMEOUT);
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();

        let err = assert_err!(config.to_server_config());
        assert!(matches!(err, ConfigError::InvalidHost(_)));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = Config::default();
        config.sessions.sweep_interval_secs = 0;
        let err = assert_err!(config.to_server_config());
        assert_eq!(
            err.to_string(),
            "sessions.sweep_interval_secs must be greater than zero"
        );

        let mut config = Config::default();
        config.publisher.interval_ms = 0;
        assert_err!(config.to_server_config());
    }

    #[test]
    fn test_config_error_into_crate_error() {
        let err: crate::PriceStreamError = ConfigError::InvalidHost("x".into()).into();
        assert!(err.to_string().contains("invalid host address: x"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"host\""));
        assert!(json.contains("\"timeout_secs\""));
        assert!(json.contains("\"interval_ms\""));
    }
}
