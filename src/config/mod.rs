//! Configuration loading for GitPortal.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GITPORTAL_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoKey;

const ENV_PREFIX: &str = "GITPORTAL_";

/// Application configuration derived from `GITPORTAL_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    /// Login of the local operator, used to compute "assigned to me".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_login: Option<String>,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Bounds for a single sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Maximum number of (repository, resource kind) fetches in flight.
    #[serde(default = "default_sync_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,
    /// Hard stop on pages fetched per resource kind in one run.
    #[serde(default = "default_sync_max_pages")]
    pub max_pages: u32,
}

/// Initial auto-sync settings; they can be changed at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    #[serde(default = "default_auto_sync_enabled")]
    pub auto_sync_enabled: bool,
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,
    #[serde(default = "default_scheduler_tick_seconds")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_scheduler_jitter_pct")]
    pub jitter_pct: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crypto_key: None,
            operator_login: None,
            http_timeout_seconds: default_http_timeout_seconds(),
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_sync_concurrency(),
            page_size: default_sync_page_size(),
            max_pages: default_sync_max_pages(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_sync_enabled: default_auto_sync_enabled(),
            sync_interval_minutes: default_sync_interval_minutes(),
            tick_interval_seconds: default_scheduler_tick_seconds(),
            jitter_pct: default_scheduler_jitter_pct(),
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Returns the token sealing key.
    pub fn crypto_key(&self) -> Result<CryptoKey, ConfigError> {
        let bytes = self.crypto_key.clone().ok_or(ConfigError::MissingCryptoKey)?;
        let length = bytes.len();
        CryptoKey::new(bytes).map_err(|_| ConfigError::InvalidCryptoKeyLength { length })
    }

    /// Returns a JSON representation with secrets redacted.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        serde_json::to_string_pretty(&config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key.as_ref() {
            None => return Err(ConfigError::MissingCryptoKey),
            Some(key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.http_timeout_seconds == 0 || self.http_timeout_seconds > 300 {
            return Err(ConfigError::InvalidHttpTimeout {
                value: self.http_timeout_seconds,
            });
        }

        if self.operator_login.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(ConfigError::InvalidOperatorLogin);
        }

        self.sync.validate()?;
        self.scheduler.validate()?;

        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::InvalidSyncConcurrency {
                value: self.concurrency,
            });
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(ConfigError::InvalidSyncPageSize {
                value: self.page_size,
            });
        }
        if !(1..=1000).contains(&self.max_pages) {
            return Err(ConfigError::InvalidSyncMaxPages {
                value: self.max_pages,
            });
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SYNC_INTERVAL_MINUTES).contains(&self.sync_interval_minutes) {
            return Err(ConfigError::InvalidSyncInterval {
                value: self.sync_interval_minutes,
            });
        }
        if self.tick_interval_seconds == 0 {
            return Err(ConfigError::InvalidSchedulerTickInterval {
                value: self.tick_interval_seconds,
            });
        }
        if !(0.0..=0.5).contains(&self.jitter_pct) {
            return Err(ConfigError::InvalidSchedulerJitter {
                value: self.jitter_pct,
            });
        }
        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://gitportal.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_sync_concurrency() -> usize {
    4
}

fn default_sync_page_size() -> u32 {
    100
}

fn default_sync_max_pages() -> u32 {
    20
}

fn default_auto_sync_enabled() -> bool {
    true
}

/// Thirty days.
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 43_200;

fn default_sync_interval_minutes() -> u64 {
    30
}

fn default_scheduler_tick_seconds() -> u64 {
    60
}

fn default_scheduler_jitter_pct() -> f64 {
    0.1
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("crypto key is missing; set GITPORTAL_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("http timeout must be between 1 and 300 seconds, got {value}")]
    InvalidHttpTimeout { value: u64 },
    #[error("operator login must not be blank")]
    InvalidOperatorLogin,
    #[error("sync concurrency must be between 1 and 64, got {value}")]
    InvalidSyncConcurrency { value: usize },
    #[error("sync page size must be between 1 and 100, got {value}")]
    InvalidSyncPageSize { value: u32 },
    #[error("sync max pages must be between 1 and 1000, got {value}")]
    InvalidSyncMaxPages { value: u32 },
    #[error("sync interval must be between 1 and {MAX_SYNC_INTERVAL_MINUTES} minutes, got {value}")]
    InvalidSyncInterval { value: u64 },
    #[error("scheduler tick interval must be at least 1 second, got {value}")]
    InvalidSchedulerTickInterval { value: u64 },
    #[error("scheduler jitter percentage must be between 0.0 and 0.5, got {value}")]
    InvalidSchedulerJitter { value: f64 },
}

/// Loads configuration using layered `.env` files and `GITPORTAL_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Process environment wins over every file.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(default_log_format);
        let database_url = take("DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take("DB_MAX_CONNECTIONS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let crypto_key = match take("CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let operator_login = take("OPERATOR_LOGIN").map(|v| v.trim().to_string());
        let http_timeout_seconds = take("HTTP_TIMEOUT_SECONDS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(default_http_timeout_seconds);

        let sync = SyncConfig {
            concurrency: take("SYNC_CONCURRENCY")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_sync_concurrency),
            page_size: take("SYNC_PAGE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_sync_page_size),
            max_pages: take("SYNC_MAX_PAGES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_sync_max_pages),
        };

        let scheduler = SchedulerConfig {
            auto_sync_enabled: take("AUTO_SYNC_ENABLED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or_else(default_auto_sync_enabled),
            sync_interval_minutes: take("SYNC_INTERVAL_MINUTES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_sync_interval_minutes),
            tick_interval_seconds: take("SCHEDULER_TICK_SECONDS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_scheduler_tick_seconds),
            jitter_pct: take("SCHEDULER_JITTER_PCT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_scheduler_jitter_pct),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crypto_key,
            operator_login,
            http_timeout_seconds,
            sync,
            scheduler,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
