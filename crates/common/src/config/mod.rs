//! Configuration management for DeskFlow services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration; unused by the notifier
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,

    /// Notification rendering and recipients
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body (multipart submissions included)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending migrations on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token validation
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Role name granting administration access
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Base URL of the storage platform (e.g. https://xyz.supabase.co)
    pub url: Option<String>,

    /// Service key used for uploads and signing
    pub service_key: Option<String>,

    /// Bucket holding attachments
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Signed download URL validity in seconds
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,

    /// Concurrent uploads per submission (1 = sequential)
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Per-file size limit in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Request timeout in seconds
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

/// Mail transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailProvider {
    /// SMTP relay with username/password credentials
    Smtp,
    /// Transactional email HTTP API
    Api,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_provider")]
    pub provider: MailProvider,

    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP submission port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_username: Option<String>,

    pub smtp_password: Option<String>,

    /// Transactional API base URL
    #[serde(default = "default_mail_api_base")]
    pub api_base: String,

    pub api_key: Option<String>,

    /// Sender display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Sender address (falls back to the SMTP username)
    pub from_address: Option<String>,

    /// Request timeout in seconds (API provider)
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Recipients used when a company has no configuration row
    #[serde(default = "default_recipients")]
    pub default_recipients: Vec<String>,

    /// Local UTC offset for the submission timestamp, in minutes
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Download and attach files in the notification endpoint
    #[serde(default = "default_enabled")]
    pub attach_files: bool,

    /// Total bytes the notification endpoint will download for attachments
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_body_bytes() -> usize { 64 * 1024 * 1024 }
fn default_database_url() -> String { "postgres://localhost/deskflow".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_admin_role() -> String { "admin".to_string() }
fn default_bucket() -> String { crate::DEFAULT_ATTACHMENT_BUCKET.to_string() }
fn default_signed_url_ttl() -> u64 { crate::SIGNED_URL_TTL_SECS }
fn default_upload_concurrency() -> usize { 1 }
fn default_max_file_bytes() -> u64 { crate::orders::MAX_FILE_BYTES }
fn default_storage_timeout() -> u64 { 60 }
fn default_mail_provider() -> MailProvider { MailProvider::Smtp }
fn default_smtp_host() -> String { "smtp.gmail.com".to_string() }
fn default_smtp_port() -> u16 { 465 }
fn default_mail_api_base() -> String { "https://api.resend.com".to_string() }
fn default_from_name() -> String { "DeskFlow FCH".to_string() }
fn default_mail_timeout() -> u64 { 30 }
fn default_recipients() -> Vec<String> {
    vec![
        "fabiola.gonzalez@fch.cl".to_string(),
        "emilio.lopez@fch.cl".to_string(),
    ]
}
fn default_utc_offset_minutes() -> i32 { -180 }
fn default_max_download_bytes() -> u64 { 25 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "deskflow".to_string() }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 20 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__MAIL__SMTP_PASSWORD=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notifications.default_recipients")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl MailConfig {
    /// Sender address, falling back to the SMTP account
    pub fn sender_address(&self) -> Option<&str> {
        self.from_address
            .as_deref()
            .or(self.smtp_username.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// `Name <address>` mailbox string for the From header
    pub fn sender_mailbox(&self) -> Option<String> {
        self.sender_address()
            .map(|address| format!("{} <{}>", self.from_name, address))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            admin_role: default_admin_role(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            bucket: default_bucket(),
            signed_url_ttl_secs: default_signed_url_ttl(),
            upload_concurrency: default_upload_concurrency(),
            max_file_bytes: default_max_file_bytes(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            api_base: default_mail_api_base(),
            api_key: None,
            from_name: default_from_name(),
            from_address: None,
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_recipients: default_recipients(),
            utc_offset_minutes: default_utc_offset_minutes(),
            attach_files: default_enabled(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            mail: MailConfig::default(),
            notifications: NotificationConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.bucket, "oc-adjuntos");
        assert_eq!(config.storage.signed_url_ttl_secs, 604_800);
        assert_eq!(config.storage.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.notifications.default_recipients.len(), 2);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/deskflow");
    }

    #[test]
    fn test_sender_falls_back_to_smtp_username() {
        let mut mail = MailConfig::default();
        assert_eq!(mail.sender_mailbox(), None);

        mail.smtp_username = Some("oc@fch.cl".to_string());
        assert_eq!(mail.sender_mailbox().as_deref(), Some("DeskFlow FCH <oc@fch.cl>"));

        mail.from_address = Some("noreply@fch.cl".to_string());
        assert_eq!(mail.sender_address(), Some("noreply@fch.cl"));
    }
}
