use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the admissions service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Spreadsheet mirror configuration (absent = mirror disabled)
    pub sheets: Option<SheetsConfig>,
    /// Document storage configuration (absent = uploads disabled)
    pub storage: Option<StorageConfig>,
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

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
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
    /// Maximum accepted body size for document uploads
    #[serde(default = "default_upload_limit")]
    pub upload_limit_bytes: usize,
    /// Literal prefix of generated application identifiers
    #[serde(default = "default_application_id_prefix")]
    pub application_id_prefix: String,
}

/// Google Sheets mirror configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    /// Target spreadsheet ID
    pub spreadsheet_id: String,
    /// Tab that receives the mirrored rows
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// Sheets API base URL
    #[serde(default = "default_sheets_api_base_url")]
    pub api_base_url: String,
    /// Service-account key as inline JSON
    pub credentials_json: Option<String>,
    /// Path to a service-account key file
    pub credentials_file: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// S3 document storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket receiving uploaded documents
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Key prefix ("folder") for all uploads
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Public base URL used to build viewable links
    pub public_base_url: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "admissions-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_upload_limit() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_application_id_prefix() -> String {
    "PPSU".to_string()
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_sheets_api_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_folder() -> String {
    "admissions".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "admissions-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(
                config::File::with_name("config/admissions")
                    .required(false)
            )
            .add_source(
                config::File::with_name("/etc/admissions/admissions")
                    .required(false)
            )
            // ADMISSIONS__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("ADMISSIONS")
                    .separator("__")
                    .try_parsing(true)
            )
            // Hosting platforms hand out the listen port as PORT
            .set_override_option("api.port", std::env::var("PORT").ok())?
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl SheetsConfig {
    /// Get the per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
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
            upload_limit_bytes: default_upload_limit(),
            application_id_prefix: default_application_id_prefix(),
        }
    }
}
