//! Configuration management
//!
//! Settings live in a TOML file at `$XFER_CONFIG_DIR/config.toml`, falling
//! back to the platform config directory (`~/.config/xfer/config.toml` on
//! Linux). A missing file yields defaults. Store connection values can be
//! overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::TransferConfig;
use crate::error::{Error, Result};
use crate::key::normalize_prefix;
use crate::retry::RetryPolicy;

const CONFIG_DIR_ENV: &str = "XFER_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreSettings,
    pub transfer: TransferSettings,
}

/// Connection settings for the backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Custom endpoint; the provider default is used when absent
    pub endpoint: Option<String>,
    pub region: String,
    /// Container (bucket) every operation targets
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Address buckets by path instead of virtual host
    pub path_style: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

/// Transfer defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub prefix: String,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            concurrency: 1,
            timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Config {
    /// Check every value that cannot be caught by deserialization
    pub fn validate(&self) -> Result<()> {
        if self.store.bucket.trim().is_empty() {
            return Err(Error::Config("store.bucket must not be empty".into()));
        }
        if let Some(endpoint) = &self.store.endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                Error::Config(format!("store.endpoint '{endpoint}' is not a valid URL: {e}"))
            })?;
        }
        if self.store.access_key.is_some() != self.store.secret_key.is_some() {
            return Err(Error::Config(
                "store.access_key and store.secret_key must be set together".into(),
            ));
        }
        if self.transfer.concurrency == 0 {
            return Err(Error::Config("transfer.concurrency must be at least 1".into()));
        }
        if self.transfer.timeout_secs == 0 {
            return Err(Error::Config("transfer.timeout_secs must be at least 1".into()));
        }
        normalize_prefix(&self.transfer.prefix)
            .map_err(|e| Error::Config(format!("transfer.prefix: {e}")))?;
        self.transfer.retry.to_policy()?;
        Ok(())
    }

    /// Build the coordinator settings, validating first
    pub fn transfer_config(&self) -> Result<TransferConfig> {
        self.validate()?;
        Ok(TransferConfig {
            default_prefix: normalize_prefix(&self.transfer.prefix)?,
            concurrency: self.transfer.concurrency,
            request_timeout: Duration::from_secs(self.transfer.timeout_secs),
            retry: self.transfer.retry.to_policy()?,
        })
    }

    /// Apply `XFER_*` overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(endpoint) = non_empty("XFER_ENDPOINT") {
            self.store.endpoint = Some(endpoint);
        }
        if let Some(region) = non_empty("XFER_REGION") {
            self.store.region = region;
        }
        if let Some(bucket) = non_empty("XFER_BUCKET") {
            self.store.bucket = bucket;
        }
        if let Some(access_key) = non_empty("XFER_ACCESS_KEY") {
            self.store.access_key = Some(access_key);
        }
        if let Some(secret_key) = non_empty("XFER_SECRET_KEY") {
            self.store.secret_key = Some(secret_key);
        }
    }
}

/// Loads and saves the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Locate the config file from `XFER_CONFIG_DIR` or the platform default
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("could not determine config directory".into()))?
                .join("xfer"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Read the file, or return defaults if it does not exist
    pub fn load(&self) -> Result<Config> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("{}: {e}", self.config_path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.config_path.display(),
                    "No config file, using defaults"
                );
                Ok(Config::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Load the file and apply overrides from the process environment
    pub fn load_with_env(&self) -> Result<Config> {
        let mut config = self.load()?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn valid() -> Config {
        let mut config = Config::default();
        config.store.bucket = "backups".into();
        config
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));
        assert_eq!(manager.load().unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[store]
bucket = "media"
endpoint = "http://localhost:9000"
path_style = true

[transfer]
concurrency = 8

[transfer.retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.store.bucket, "media");
        assert_eq!(config.store.region, "us-east-1");
        assert!(config.store.path_style);
        assert_eq!(config.transfer.concurrency, 8);
        assert_eq!(config.transfer.retry.max_attempts, 5);
        assert_eq!(config.transfer.retry.initial_delay_ms, 100);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store\nbucket=").unwrap();

        let result = ConfigManager::with_path(&path).load();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested/config.toml"));
        let mut config = valid();
        config.transfer.prefix = "daily".into();

        manager.save(&config).unwrap();
        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("XFER_BUCKET", "from-env"),
            ("XFER_ENDPOINT", "http://minio:9000"),
            ("XFER_REGION", ""),
        ]
        .into_iter()
        .collect();

        let mut config = valid();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.store.bucket, "from-env");
        assert_eq!(config.store.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.store.region, "us-east-1");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(matches!(Config::default().validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.store.endpoint = Some("not a url".into());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.transfer.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.transfer.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.store.access_key = Some("key".into());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.transfer.prefix = "../up".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transfer_config() {
        let mut config = valid();
        config.transfer.prefix = "/a//b/".into();
        config.transfer.timeout_secs = 5;

        let transfer = config.transfer_config().unwrap();
        assert_eq!(transfer.default_prefix, "a/b");
        assert_eq!(transfer.request_timeout, Duration::from_secs(5));
        assert_eq!(transfer.retry.max_attempts(), 3);
    }
}
