//! Application configuration
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file still yields a working configuration. Monit credentials may
//! be overridden through the `MONIT_URL`, `MONIT_USER` and `MONIT_PASS`
//! environment variables, which take precedence over file values.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub monit: MonitConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

/// Connection settings for the Monit status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitConfig {
    /// Full URL of the XML status endpoint
    #[serde(default = "default_monit_url")]
    pub url: String,
    /// HTTP basic auth username
    #[serde(default = "default_monit_user")]
    pub username: String,
    /// HTTP basic auth password
    #[serde(default = "default_monit_pass")]
    pub password: String,
    /// Request timeout in seconds
    #[serde(default = "default_monit_timeout_secs")]
    pub timeout_secs: u64,
}

/// Poll scheduling and snapshot retention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Snapshots older than this many days are swept after each ingest
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

/// Snapshot store location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Which analysis backend receives the per-cycle bundle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    Mock,
}

/// Analysis collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default = "default_backend_kind")]
    pub backend: BackendKind,
    /// Base URL of the Ollama server
    #[serde(default = "default_analysis_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_analysis_model")]
    pub model: String,
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f32,
}

/// Log aggregation settings: per-strategy timeout plus the per-service
/// fetch-spec table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogsConfig {
    /// Hard timeout for a single log fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Fetch spec keyed by service name; services absent here fall back to
    /// a journal query derived from the service name
    #[serde(default)]
    pub services: BTreeMap<String, LogFetchSpec>,
}

/// How to retrieve diagnostic log context for one service
///
/// The `strategy` tag selects one of three retrieval methods; the remaining
/// fields are strategy-specific. `max_lines` bounds the returned context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum LogFetchSpec {
    /// Read the last `max_lines` lines of a single file
    TailFile {
        path: PathBuf,
        #[serde(default = "default_max_lines")]
        max_lines: usize,
    },
    /// Among files matching `pattern`, tail the most recently modified one
    NewestOfGlob {
        pattern: String,
        #[serde(default = "default_max_lines")]
        max_lines: usize,
    },
    /// Query the system journal for a named unit
    JournalQuery {
        unit: String,
        #[serde(default)]
        user_service: bool,
        #[serde(default = "default_max_lines")]
        max_lines: usize,
    },
}

impl LogFetchSpec {
    pub fn max_lines(&self) -> usize {
        match self {
            LogFetchSpec::TailFile { max_lines, .. }
            | LogFetchSpec::NewestOfGlob { max_lines, .. }
            | LogFetchSpec::JournalQuery { max_lines, .. } => *max_lines,
        }
    }
}

fn default_monit_url() -> String {
    "http://localhost:2812/_status?format=xml".to_string()
}

fn default_monit_user() -> String {
    "admin".to_string()
}

fn default_monit_pass() -> String {
    "monit".to_string()
}

const fn default_monit_timeout_secs() -> u64 {
    10
}

const fn default_interval_secs() -> u64 {
    300
}

const fn default_retention_days() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("monit_history.db")
}

const fn default_backend_kind() -> BackendKind {
    BackendKind::Ollama
}

fn default_analysis_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_analysis_model() -> String {
    "llama3.1:8b".to_string()
}

const fn default_analysis_temperature() -> f32 {
    0.2
}

const fn default_fetch_timeout_secs() -> u64 {
    10
}

pub(crate) const fn default_max_lines() -> usize {
    100
}

impl Default for MonitConfig {
    fn default() -> Self {
        Self {
            url: default_monit_url(),
            username: default_monit_user(),
            password: default_monit_pass(),
            timeout_secs: default_monit_timeout_secs(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_kind(),
            endpoint: default_analysis_endpoint(),
            model: default_analysis_model(),
            temperature: default_analysis_temperature(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            services: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {e}", path.display())))?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `path`, writing a default file if none exists
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed, or if
    /// the default file cannot be written.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Config::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Serialize this configuration to `path` as TOML
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `MONIT_URL`/`MONIT_USER`/`MONIT_PASS` from the process
    /// environment over the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("MONIT_URL") {
            self.monit.url = url;
        }
        if let Some(user) = get("MONIT_USER") {
            self.monit.username = user;
        }
        if let Some(pass) = get("MONIT_PASS") {
            self.monit.password = pass;
        }
    }

    /// Check the configuration for values that cannot work at runtime
    ///
    /// # Errors
    /// Returns a validation error naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monit.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "monit.url must not be empty".to_string(),
            ));
        }
        if self.poller.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poller.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.poller.retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "poller.retention_days must be greater than zero".to_string(),
            ));
        }
        if self.logs.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "logs.fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for (service, spec) in &self.logs.services {
            if spec.max_lines() == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "logs.services.{service}: max_lines must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poller.interval_secs, 300);
        assert_eq!(config.poller.retention_days, 30);
        assert_eq!(config.monit.timeout_secs, 10);
        assert_eq!(config.analysis.backend, BackendKind::Ollama);
        assert_eq!(config.analysis.model, "llama3.1:8b");
        assert!(config.logs.services.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [poller]
            interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.poller.interval_secs, 60);
        assert_eq!(config.poller.retention_days, 30);
        assert_eq!(config.monit.username, "admin");
    }

    #[test]
    fn test_log_spec_strategies_parse() {
        let config: Config = toml::from_str(
            r#"
            [logs.services.nginx]
            strategy = "tail-file"
            path = "/var/log/nginx/error.log"
            max_lines = 50

            [logs.services.backup]
            strategy = "newest-of-glob"
            pattern = "/var/backups/backup_log_*.log"
            max_lines = 150

            [logs.services.syncthing]
            strategy = "journal-query"
            unit = "syncthing.service"
            user_service = true
            "#,
        )
        .unwrap();

        assert_eq!(
            config.logs.services["nginx"],
            LogFetchSpec::TailFile {
                path: PathBuf::from("/var/log/nginx/error.log"),
                max_lines: 50,
            }
        );
        assert_eq!(
            config.logs.services["backup"],
            LogFetchSpec::NewestOfGlob {
                pattern: "/var/backups/backup_log_*.log".to_string(),
                max_lines: 150,
            }
        );
        assert_eq!(
            config.logs.services["syncthing"],
            LogFetchSpec::JournalQuery {
                unit: "syncthing.service".to_string(),
                user_service: true,
                max_lines: 100,
            }
        );
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [logs.services.app]
            strategy = "docker-logs"
            container = "app"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("MONIT_URL", "http://monit.internal:2812/_status?format=xml"),
            ("MONIT_PASS", "s3cret"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.monit.url,
            "http://monit.internal:2812/_status?format=xml"
        );
        assert_eq!(config.monit.username, "admin");
        assert_eq!(config.monit.password, "s3cret");
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = Config::default();
        config.poller.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_url() {
        let mut config = Config::default();
        config.monit.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_max_lines() {
        let mut config = Config::default();
        config.logs.services.insert(
            "nginx".to_string(),
            LogFetchSpec::TailFile {
                path: PathBuf::from("/var/log/nginx/error.log"),
                max_lines: 0,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.poller.interval_secs = 120;
        config.logs.services.insert(
            "redis".to_string(),
            LogFetchSpec::JournalQuery {
                unit: "redis-server.service".to_string(),
                user_service: false,
                max_lines: 80,
            },
        );

        config.save_to(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
