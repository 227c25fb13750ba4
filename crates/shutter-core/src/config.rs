//! Configuration module
//!
//! `UploadConfig::from_env` reads `SHUTTER_*` variables (after loading an
//! optional `.env` file). `UploadConfig::default()` yields the same defaults
//! for library and test use.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::models::{ConnectionClass, NetworkHints};

/// Durable item store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "file" => Ok(StoreBackend::Local),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StoreBackend::Local => write!(f, "local"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Upload pipeline configuration
#[derive(Clone, Debug)]
pub struct UploadConfig {
    // Remote API
    pub api_url: String,
    pub api_version: String,
    pub api_token: Option<String>,
    /// Sent as `X-API-Key` when no bearer token is configured.
    pub api_key: Option<String>,
    // Durable item store
    pub store_backend: StoreBackend,
    pub store_path: PathBuf,
    pub session_retention_hours: u64,
    pub max_session_bytes: u64,
    // Retry controller
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_growth_factor: f64,
    pub retry_max_jitter_ms: u64,
    // Credential broker
    pub credential_chunk_size: usize,
    pub credential_validity_secs: u64,
    // Compression stage
    pub compression_concurrency: usize,
    pub compression_timeout_secs: u64,
    pub compression_skip_threshold_bytes: u64,
    // Transfer engine
    pub transfer_timeout_secs: u64,
    pub inter_item_delay_ms: u64,
    // Entry validation
    pub max_file_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    // Network profiler hints
    pub network_hints: NetworkHints,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            api_version: "v0".to_string(),
            api_token: None,
            api_key: None,
            store_backend: StoreBackend::Local,
            store_path: default_store_path(),
            session_retention_hours: DEFAULT_SESSION_RETENTION_HOURS,
            max_session_bytes: DEFAULT_MAX_SESSION_BYTES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_growth_factor: DEFAULT_RETRY_GROWTH_FACTOR,
            retry_max_jitter_ms: DEFAULT_RETRY_MAX_JITTER_MS,
            credential_chunk_size: DEFAULT_CREDENTIAL_CHUNK_SIZE,
            credential_validity_secs: DEFAULT_CREDENTIAL_VALIDITY_SECS,
            compression_concurrency: DEFAULT_COMPRESSION_CONCURRENCY,
            compression_timeout_secs: DEFAULT_COMPRESSION_TIMEOUT_SECS,
            compression_skip_threshold_bytes: DEFAULT_COMPRESSION_SKIP_THRESHOLD_BYTES,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT_SECS,
            inter_item_delay_ms: DEFAULT_INTER_ITEM_DELAY_MS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_content_types: split_list(DEFAULT_ALLOWED_CONTENT_TYPES),
            network_hints: NetworkHints::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    env::temp_dir().join("shutter").join("sessions")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl UploadConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = UploadConfig::default();

        let store_backend = match env::var("SHUTTER_STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store_backend,
        };

        let effective_type = match env::var("SHUTTER_EFFECTIVE_TYPE") {
            Ok(value) => Some(value.parse::<ConnectionClass>()?),
            Err(_) => None,
        };

        let network_hints = NetworkHints {
            effective_type,
            save_data: env_or("SHUTTER_SAVE_DATA", false),
            device_memory_gb: env::var("SHUTTER_DEVICE_MEMORY_GB")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        let config = UploadConfig {
            api_url: env::var("SHUTTER_API_URL")
                .or_else(|_| env::var("API_URL"))
                .unwrap_or(defaults.api_url),
            api_version: env::var("SHUTTER_API_VERSION").unwrap_or(defaults.api_version),
            api_token: env::var("SHUTTER_API_TOKEN")
                .or_else(|_| env::var("API_TOKEN"))
                .ok(),
            api_key: env::var("SHUTTER_API_KEY").ok(),
            store_backend,
            store_path: env::var("SHUTTER_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            session_retention_hours: env_or(
                "SHUTTER_SESSION_RETENTION_HOURS",
                defaults.session_retention_hours,
            ),
            max_session_bytes: env_or("SHUTTER_MAX_SESSION_BYTES", defaults.max_session_bytes),
            max_retries: env_or("SHUTTER_MAX_RETRIES", defaults.max_retries),
            retry_base_delay_ms: env_or("SHUTTER_RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            retry_growth_factor: env_or(
                "SHUTTER_RETRY_GROWTH_FACTOR",
                defaults.retry_growth_factor,
            ),
            retry_max_jitter_ms: env_or("SHUTTER_RETRY_MAX_JITTER_MS", defaults.retry_max_jitter_ms),
            credential_chunk_size: env_or(
                "SHUTTER_CREDENTIAL_CHUNK_SIZE",
                defaults.credential_chunk_size,
            ),
            credential_validity_secs: env_or(
                "SHUTTER_CREDENTIAL_VALIDITY_SECS",
                defaults.credential_validity_secs,
            ),
            compression_concurrency: env_or(
                "SHUTTER_COMPRESSION_CONCURRENCY",
                defaults.compression_concurrency,
            ),
            compression_timeout_secs: env_or(
                "SHUTTER_COMPRESSION_TIMEOUT_SECS",
                defaults.compression_timeout_secs,
            ),
            compression_skip_threshold_bytes: env_or(
                "SHUTTER_COMPRESSION_SKIP_THRESHOLD_BYTES",
                defaults.compression_skip_threshold_bytes,
            ),
            transfer_timeout_secs: env_or(
                "SHUTTER_TRANSFER_TIMEOUT_SECS",
                defaults.transfer_timeout_secs,
            ),
            inter_item_delay_ms: env_or("SHUTTER_INTER_ITEM_DELAY_MS", defaults.inter_item_delay_ms),
            max_file_size_bytes: env_or("SHUTTER_MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes),
            allowed_content_types: env::var("SHUTTER_ALLOWED_CONTENT_TYPES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.allowed_content_types),
            network_hints,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.api_url.trim().is_empty() {
            return Err(anyhow::anyhow!("SHUTTER_API_URL must not be empty"));
        }
        if self.credential_chunk_size == 0 {
            return Err(anyhow::anyhow!(
                "SHUTTER_CREDENTIAL_CHUNK_SIZE must be greater than 0"
            ));
        }
        if self.compression_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "SHUTTER_COMPRESSION_CONCURRENCY must be greater than 0"
            ));
        }
        if !self.retry_growth_factor.is_finite() || self.retry_growth_factor < 1.0 {
            return Err(anyhow::anyhow!(
                "SHUTTER_RETRY_GROWTH_FACTOR must be a finite number >= 1.0"
            ));
        }
        if self.transfer_timeout_secs == 0 || self.compression_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0 seconds"));
        }
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "SHUTTER_MAX_FILE_SIZE_BYTES must be greater than 0"
            ));
        }
        if self.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "SHUTTER_ALLOWED_CONTENT_TYPES must list at least one type"
            ));
        }
        Ok(())
    }

    /// API version prefix (e.g. "/api/v0").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    pub fn credential_validity(&self) -> Duration {
        Duration::from_secs(self.credential_validity_secs)
    }

    pub fn compression_timeout(&self) -> Duration {
        Duration::from_secs(self.compression_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}
