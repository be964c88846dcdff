use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use domain::models::data_deletion::DELETION_GRACE_PERIOD_DAYS;
use domain::models::FlagEnvironment;
use domain::services::{BackupSettings, LoginSecuritySettings};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub login_security: LoginSecurityConfig,
    #[serde(default)]
    pub data_deletion: DataDeletionConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-IP quota on the service routes. Zero disables the limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Only enable behind TLS termination.
    #[serde(default)]
    pub hsts_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Runtime environment flags are evaluated against: dev, staging or prod.
    #[serde(default = "default_environment")]
    pub name: String,
}

impl EnvironmentConfig {
    pub fn flag_environment(&self) -> Result<FlagEnvironment, String> {
        match self.name.parse::<FlagEnvironment>()? {
            FlagEnvironment::All => Err("Runtime environment cannot be 'all'".to_string()),
            env => Ok(env),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSecurityConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Rows removed per statement by the retention job.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: i64,
}

impl Default for LoginSecurityConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_minutes: default_window_minutes(),
            retention_days: default_retention_days(),
            purge_batch_size: default_purge_batch_size(),
        }
    }
}

impl From<&LoginSecurityConfig> for LoginSecuritySettings {
    fn from(config: &LoginSecurityConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window_minutes: config.window_minutes,
            retention_days: config.retention_days,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataDeletionConfig {
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i64,

    /// How often the execution job looks for due requests.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_execution_batch_size")]
    pub batch_size: i64,
}

impl Default for DataDeletionConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_execution_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_dump_command")]
    pub dump_command: String,

    /// Database the dump utility connects to. Falls back to `database.url` when empty.
    #[serde(default)]
    pub connection_uri: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_backup_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_backup_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_download_ttl")]
    pub download_ttl_secs: i64,

    /// HMAC key for signed download links.
    #[serde(default)]
    pub download_secret: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    600
}
fn default_environment() -> String {
    "dev".to_string()
}
fn default_max_attempts() -> u32 {
    5
}
fn default_window_minutes() -> u32 {
    15
}
fn default_retention_days() -> i64 {
    30
}
fn default_purge_batch_size() -> i64 {
    1000
}
fn default_grace_period_days() -> i64 {
    DELETION_GRACE_PERIOD_DAYS
}
fn default_poll_interval_secs() -> u64 {
    300
}
fn default_execution_batch_size() -> i64 {
    50
}
fn default_dump_command() -> String {
    "pg_dump".to_string()
}
fn default_output_dir() -> String {
    "./backups".to_string()
}
fn default_backup_timeout() -> u64 {
    3600
}
fn default_backup_retention_days() -> i64 {
    30
}
fn default_download_ttl() -> i64 {
    900
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional)
    /// 3. Environment variables with CP__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CP").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from embedded defaults plus overrides, without files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            rate_limit_per_minute = 600

            [environment]
            name = "prod"

            [backup]
            dump_command = "pg_dump"
            output_dir = "./backups"
            download_secret = "test-download-secret"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CP__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        self.logging
            .format
            .parse::<crate::middleware::logging::LogFormat>()
            .map_err(ConfigValidationError::InvalidValue)?;

        self.environment
            .flag_environment()
            .map_err(ConfigValidationError::InvalidValue)?;

        if self.data_deletion.grace_period_days < DELETION_GRACE_PERIOD_DAYS {
            return Err(ConfigValidationError::InvalidValue(format!(
                "data_deletion.grace_period_days must be at least {}",
                DELETION_GRACE_PERIOD_DAYS
            )));
        }

        if self.backup.download_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CP__BACKUP__DOWNLOAD_SECRET environment variable must be set".to_string(),
            ));
        }

        if self.backup.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "backup.timeout_secs cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Runtime environment, falling back to `dev` for unparseable names.
    pub fn flag_environment(&self) -> FlagEnvironment {
        self.environment
            .flag_environment()
            .unwrap_or(FlagEnvironment::Dev)
    }

    pub fn backup_settings(&self) -> BackupSettings {
        let connection_uri = if self.backup.connection_uri.is_empty() {
            self.database.url.clone()
        } else {
            self.backup.connection_uri.clone()
        };

        BackupSettings {
            dump_command: self.backup.dump_command.clone(),
            connection_uri,
            output_dir: PathBuf::from(&self.backup.output_dir),
            timeout: std::time::Duration::from_secs(self.backup.timeout_secs),
            retention_days: self.backup.retention_days,
            download_ttl_seconds: self.backup.download_ttl_secs,
            download_secret: self.backup.download_secret.clone(),
        }
    }
}
