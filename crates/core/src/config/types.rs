use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub pulldb: PullDbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pull list API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PullDbConfig {
    /// Base URL of the pull list service (e.g., "https://pulldb.example.com")
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_pulldb_timeout")]
    pub timeout_secs: u32,
}

fn default_pulldb_timeout() -> u32 {
    30
}

/// Remote object store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// First path segment of every item prefix
    #[serde(default = "default_prefix_root")]
    pub prefix_root: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_base")]
    pub upload_base: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix_root: default_prefix_root(),
            api_base: default_api_base(),
            upload_base: default_api_base(),
            token: None,
            timeout_secs: default_storage_timeout(),
        }
    }
}

fn default_bucket() -> String {
    "long-box".to_string()
}

fn default_prefix_root() -> String {
    "comics".to_string()
}

fn default_api_base() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_storage_timeout() -> u32 {
    60
}

/// Presence cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Entries written per batch by multi_set
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: default_cache_path(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("pullsync.db")
}

fn default_batch_size() -> usize {
    50
}

/// Available cache backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Backoff applied to every object store call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    5
}

/// Local mirror sync configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Maximum number of items admitted per run
    #[serde(default = "default_sync_count")]
    pub count: usize,
    /// Expire every local file outside the admitted set, even if still unread
    #[serde(default)]
    pub strict: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            destination: None,
            count: default_sync_count(),
            strict: false,
        }
    }
}

fn default_sync_count() -> usize {
    25
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Maximum weighted distance accepted for automated uploads
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    0.25
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write metrics in text exposition format to this file after each run
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for diagnostics output (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub pulldb: SanitizedPullDbConfig,
    pub storage: SanitizedStorageConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPullDbConfig {
    pub base_url: String,
    pub token_configured: bool,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub bucket: String,
    pub prefix_root: String,
    pub api_base: String,
    pub token_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            pulldb: SanitizedPullDbConfig {
                base_url: config.pulldb.base_url.clone(),
                token_configured: config
                    .pulldb
                    .token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.pulldb.timeout_secs,
            },
            storage: SanitizedStorageConfig {
                bucket: config.storage.bucket.clone(),
                prefix_root: config.storage.prefix_root.clone(),
                api_base: config.storage.api_base.clone(),
                token_configured: config
                    .storage
                    .token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.storage.timeout_secs,
            },
            cache: config.cache.clone(),
            retry: config.retry.clone(),
            sync: config.sync.clone(),
            matcher: config.matcher.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[pulldb]
base_url = "https://pulldb.example.com"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pulldb.base_url, "https://pulldb.example.com");
        assert_eq!(config.pulldb.timeout_secs, 30);
        assert_eq!(config.storage.bucket, "long-box");
        assert_eq!(config.storage.prefix_root, "comics");
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.cache.batch_size, 50);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.sync.count, 25);
        assert!(!config.sync.strict);
        assert!((config.matcher.threshold - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_missing_pulldb_fails() {
        let toml = r#"
[sync]
count = 10
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_memory_backend() {
        let toml = r#"
[pulldb]
base_url = "https://pulldb.example.com"

[cache]
backend = "memory"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.path.to_str().unwrap(), "pullsync.db");
    }

    #[test]
    fn test_deserialize_sync_section() {
        let toml = r#"
[pulldb]
base_url = "https://pulldb.example.com"

[sync]
destination = "/mnt/tablet/comics"
count = 40
strict = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.sync.destination.as_deref().unwrap().to_str().unwrap(),
            "/mnt/tablet/comics"
        );
        assert_eq!(config.sync.count, 40);
        assert!(config.sync.strict);
    }

    #[test]
    fn test_sanitized_config_hides_tokens() {
        let toml = r#"
[pulldb]
base_url = "https://pulldb.example.com"
token = "secret-token"

[storage]
token = ""
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.pulldb.token_configured);
        assert!(!sanitized.storage.token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
