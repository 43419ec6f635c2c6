//! Configuration management.
//!
//! Layered the same way everywhere the daemon runs: defaults, an optional
//! config file, then `AYAYE__`-prefixed environment variables. A couple of
//! bare variables (`K8S_POD`, `SLEEP`, `LOG_LEVEL`) are honored for
//! compatibility with the deployment manifests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AyayeError, Result};

/// Main daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Redis (queue) configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Entity/record store configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Text-generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Processing loop configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the fabric API holding app/origin/entity records
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the generation API
    #[serde(default = "default_generation_url")]
    pub url: String,

    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    /// Path of the mounted credential file, JSON `{"key": "..."}`
    #[serde(default = "default_secret_path")]
    pub secret_path: PathBuf,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_model(),
            timeout_secs: default_generation_timeout_secs(),
            secret_path: default_secret_path(),
        }
    }
}

impl GenerationConfig {
    /// Read the API key out of the mounted credential file.
    pub fn load_api_key(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.secret_path).map_err(|e| {
            AyayeError::config(format!(
                "cannot read credential file {}: {e}",
                self.secret_path.display()
            ))
        })?;
        let secret: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| AyayeError::config(format!("credential file is not valid JSON: {e}")))?;
        secret
            .get("key")
            .cloned()
            .ok_or_else(|| AyayeError::config("credential file has no `key` field"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Per-instance consumer id, normally the pod name
    #[serde(default)]
    pub pod: Option<String>,

    /// Blocking-read timeout in seconds
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,

    /// Stream the fabric writes facts to
    #[serde(default = "default_fact_stream")]
    pub fact_stream: String,

    /// Stream the fabric writes acts to; outbound acts are appended here
    #[serde(default = "default_act_stream")]
    pub act_stream: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pod: None,
            sleep_secs: default_sleep_secs(),
            fact_stream: default_fact_stream(),
            act_stream: default_act_stream(),
        }
    }
}

impl WorkerConfig {
    /// Blocking-read timeout as a duration.
    pub fn block_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }

    /// The consumer id this instance reads under. Required at startup.
    pub fn consumer_id(&self) -> Result<&str> {
        self.pod
            .as_deref()
            .ok_or_else(|| AyayeError::config("no pod identity (set K8S_POD or AYAYE__WORKER__POD)"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter listen port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_registry_url() -> String {
    "http://api.ledger".to_string()
}
fn default_registry_timeout_secs() -> u64 {
    10
}
fn default_generation_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_secret_path() -> PathBuf {
    PathBuf::from("/opt/service/secret/openai.json")
}
fn default_sleep_secs() -> u64 {
    5
}
fn default_fact_stream() -> String {
    "ledger/fact".to_string()
}
fn default_act_stream() -> String {
    "ledger/act".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Environment::with_prefix("AYAYE").separator("__"));
        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.apply_legacy_env();
        Ok(cfg)
    }

    /// Load from a specific file path, then the environment on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("AYAYE").separator("__"));
        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.apply_legacy_env();
        Ok(cfg)
    }

    /// Bare environment variables the deployment manifests already set.
    fn apply_legacy_env(&mut self) {
        if self.worker.pod.is_none() {
            if let Ok(pod) = std::env::var("K8S_POD") {
                self.worker.pod = Some(pod);
            }
        }
        if let Ok(sleep) = std::env::var("SLEEP") {
            if let Ok(secs) = sleep.parse() {
                self.worker.sleep_secs = secs;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.observability.log_level = level.to_lowercase();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = Config {
            redis: Default::default(),
            registry: Default::default(),
            generation: Default::default(),
            worker: Default::default(),
            observability: Default::default(),
        };
        assert_eq!(config.worker.sleep_secs, 5);
        assert_eq!(config.worker.fact_stream, "ledger/fact");
        assert_eq!(config.worker.act_stream, "ledger/act");
        assert_eq!(config.generation.model, "gpt-4o");
        assert!(config.worker.consumer_id().is_err());
    }

    #[test]
    fn api_key_comes_from_credential_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"key": "funspot"}}"#).unwrap();

        let generation = GenerationConfig {
            secret_path: file.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(generation.load_api_key().unwrap(), "funspot");
    }

    #[test]
    fn missing_credential_file_is_a_config_error() {
        let generation = GenerationConfig {
            secret_path: PathBuf::from("/nonexistent/openai.json"),
            ..Default::default()
        };
        let error = generation.load_api_key().unwrap_err();
        assert!(error.is_fatal());
    }
}
