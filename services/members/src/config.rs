use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main configuration for the members service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Document store configuration
    pub database: DatabaseConfig,
    /// Media host configuration
    #[serde(default)]
    pub media: MediaConfig,
    /// Keep-alive pinger configuration
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted body size for photo uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// MongoDB configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// MongoDB connection string
    pub uri: String,
    /// Database used when the connection string names none
    #[serde(default = "default_database_name")]
    pub name: String,
    /// Collection holding member documents
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Server selection / connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum number of pooled connections
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

/// Cloudinary configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Cloud (account) name
    #[serde(default)]
    pub cloud_name: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// API secret used to sign upload requests
    #[serde(default)]
    pub api_secret: String,
    /// Upload API base URL
    #[serde(default = "default_media_api_base_url")]
    pub api_base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
}

/// Keep-alive pinger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeepAliveConfig {
    /// Public URL of this service's ping endpoint (disabled when unset)
    pub url: Option<String>,
    /// Seconds between pings
    #[serde(default = "default_keep_alive_interval_secs")]
    pub interval_secs: u64,
    /// Request timeout in seconds
    #[serde(default = "default_keep_alive_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "members-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_database_name() -> String {
    "test".to_string()
}

fn default_collection() -> String {
    "members".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_media_api_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_media_timeout_secs() -> u64 {
    60
}

fn default_keep_alive_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_keep_alive_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Start with default values
            .set_default("service.name", "members-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .set_default("api.port", 3000)?
            // Add config file if present
            .add_source(config::File::with_name("config/members").required(false))
            .add_source(config::File::with_name("/etc/members/members").required(false))
            // MEMBERS__DATABASE__URI -> database.uri
            .add_source(
                config::Environment::with_prefix("MEMBERS")
                    .separator("__")
                    .try_parsing(true),
            )
            // Plain variables set by the hosting platform win over everything else
            .set_override_option("api.port", env::var("PORT").ok())?
            .set_override_option("database.uri", env::var("MONGO_URI").ok())?
            .set_override_option("media.cloud_name", env::var("CLOUDINARY_CLOUD_NAME").ok())?
            .set_override_option("media.api_key", env::var("CLOUDINARY_API_KEY").ok())?
            .set_override_option("media.api_secret", env::var("CLOUDINARY_API_SECRET").ok())?
            .set_override_option("keep_alive.url", env::var("KEEP_ALIVE_URL").ok())?;

        builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Get media host request timeout as Duration
    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media.timeout_secs)
    }
}

impl DatabaseConfig {
    /// Get connect / server selection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl KeepAliveConfig {
    /// Get keep-alive period as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl MediaConfig {
    /// Whether all credentials needed to sign uploads are present
    pub fn has_credentials(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base_url: default_media_api_base_url(),
            timeout_secs: default_media_timeout_secs(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_secs: default_keep_alive_interval_secs(),
            timeout_secs: default_keep_alive_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_api_port(), 3000);
        assert_eq!(default_keep_alive_interval_secs(), 300);
        assert_eq!(default_collection(), "members");
    }

    #[test]
    fn test_minimal_source_fills_defaults() {
        let config: Config = config::Config::builder()
            .set_override("service.name", "members-service")
            .unwrap()
            .set_override("api.port", 8081)
            .unwrap()
            .set_override("database.uri", "mongodb://localhost:27017")
            .unwrap()
            .set_override("media.cloud_name", "demo")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api.port, 8081);
        assert_eq!(config.api.host, "0.0.0.0");
        assert!(config.api.cors_enabled);
        assert_eq!(config.database.name, "test");
        assert_eq!(config.media.api_base_url, "https://api.cloudinary.com/v1_1");
        assert!(!config.media.has_credentials());
        assert!(config.keep_alive.url.is_none());
        assert_eq!(config.keep_alive.interval(), Duration::from_secs(300));
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_database_uri_is_rejected() {
        let result: Result<Config, _> = config::Config::builder()
            .set_override("service.name", "members-service")
            .unwrap()
            .set_override("api.port", 3000)
            .unwrap()
            .set_override("media.cloud_name", "demo")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
