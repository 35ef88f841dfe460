//! Configuration module for upload-bench
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! # Example
//!
//! ```yaml
//! server:
//!   address: "0.0.0.0:8080"
//! upload:
//!   part_size: 5242880
//! targets:
//!   - name: s3
//!     backend:
//!       kind: s3
//!       bucket: bucket-name
//!       region: eu-west-1
//!       access_key: "${AWS_ACCESS_KEY_ID}"
//!       secret_key: "${AWS_SECRET_ACCESS_KEY}"
//!   - name: local
//!     backend:
//!       kind: filesystem
//!       root: /tmp/upload-bench
//! ```

use crate::backend::MIN_PART_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        ConfigLoader::load_str(content)
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one upload target must be configured".into(),
            ));
        }

        if self.upload.part_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.part_size must be positive".into(),
            ));
        }

        if self.upload.key_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upload.key_prefix cannot be empty".into(),
            ));
        }

        if self.upload.max_payload_mb == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_payload_mb must be positive".into(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Target name cannot be empty".into(),
                ));
            }
            if target.name.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "Target name '{}' cannot contain '/'",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate target name '{}'",
                    target.name
                )));
            }

            let min = target.backend.min_part_size();
            if min == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Target '{}' has a zero min_part_size",
                    target.name
                )));
            }
            if self.upload.part_size < min {
                return Err(ConfigError::ValidationError(format!(
                    "upload.part_size {} is below the minimum part size {} of target '{}'",
                    self.upload.part_size, min, target.name
                )));
            }

            match &target.backend {
                BackendConfig::S3(s3) => {
                    if s3.bucket.trim().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Target '{}' has an empty S3 bucket",
                            target.name
                        )));
                    }
                    if s3.region.trim().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Target '{}' has an empty S3 region",
                            target.name
                        )));
                    }
                    if let Some(ref endpoint) = s3.endpoint {
                        if !is_valid_http_url(endpoint) {
                            return Err(ConfigError::ValidationError(format!(
                                "Invalid S3 endpoint '{}': must start with http:// or https://",
                                endpoint
                            )));
                        }
                    }
                    if s3.max_attempts == 0 {
                        return Err(ConfigError::ValidationError(format!(
                            "Target '{}' must allow at least one attempt",
                            target.name
                        )));
                    }
                }
                BackendConfig::Filesystem(fs) => {
                    if fs.root.as_os_str().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Target '{}' has an empty filesystem root",
                            target.name
                        )));
                    }
                }
                BackendConfig::Memory(_) => {}
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be trace, debug, info, warn or error",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

/// Upload configuration, shared by every target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Chunk size used to split the payload into parts
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    /// Object keys are `<key_prefix><n>` with a process-wide counter `n`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Abort the multipart session when an upload fails
    #[serde(default = "default_abort_on_failure")]
    pub abort_on_failure: bool,
    /// Largest synthetic payload a request may ask for
    #[serde(default = "default_max_payload_mb")]
    pub max_payload_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            key_prefix: default_key_prefix(),
            abort_on_failure: default_abort_on_failure(),
            max_payload_mb: default_max_payload_mb(),
        }
    }
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

fn default_key_prefix() -> String {
    "storage-performance-test-file".to_string()
}

fn default_abort_on_failure() -> bool {
    true
}

fn default_max_payload_mb() -> u64 {
    1024
}

/// Named upload target, selected by `/upload/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub backend: BackendConfig,
}

/// Storage backend of a target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    S3(S3Config),
    Filesystem(FilesystemConfig),
    Memory(MemoryConfig),
}

impl BackendConfig {
    /// Smallest part size the backend accepts for non-final parts
    pub fn min_part_size(&self) -> usize {
        match self {
            BackendConfig::S3(_) => MIN_PART_SIZE,
            BackendConfig::Filesystem(fs) => fs.min_part_size,
            BackendConfig::Memory(mem) => mem.min_part_size,
        }
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

/// Filesystem backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    pub root: PathBuf,
    #[serde(default = "default_min_part_size")]
    pub min_part_size: usize,
}

/// In-memory backend configuration
///
/// Uploaded objects are kept in process memory until a request with
/// `cleanup=true` deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_min_part_size")]
    pub min_part_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
        }
    }
}

fn default_min_part_size() -> usize {
    MIN_PART_SIZE
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve `GET /metrics`
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
