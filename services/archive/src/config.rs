use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the archive service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object store configuration
    pub storage: StorageConfig,
    /// Relocation pipeline configuration
    #[serde(default)]
    pub relocation: RelocationConfig,
    /// Classification service configuration
    #[serde(default)]
    pub classification: ClassificationConfig,
    /// Identity provisioning configuration
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json or pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding both intake uploads and processed results
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Static access key; falls back to the default credential chain
    pub access_key_id: Option<String>,
    /// Static secret key; falls back to the default credential chain
    pub secret_access_key: Option<String>,
    /// Base URL under which public objects are reachable
    pub public_base_url: Option<String>,
}

/// Relocation pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelocationConfig {
    /// Prefix under which relocated recordings live
    #[serde(default = "default_processed_root")]
    pub processed_root: String,
    /// Suffix identifying media objects eligible for relocation
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
    /// Zone used for derived names and log partitions
    #[serde(default = "default_target_timezone")]
    pub target_timezone: String,
    /// Zone the container creation tag is assumed to be written in
    #[serde(default = "default_assumed_source_timezone")]
    pub assumed_source_timezone: String,
    /// ffprobe executable
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Directory of the daily outcome log partitions
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Classification service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    /// Endpoint receiving the form POST
    #[serde(default = "default_classification_endpoint")]
    pub endpoint: String,
    /// Form field carrying the owner candidate
    #[serde(default = "default_owner_field")]
    pub owner_field: String,
    /// Form field carrying the derived start label
    #[serde(default = "default_label_field")]
    pub label_field: String,
}

/// Identity provisioning configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Policy attached to every provisioned principal
    pub policy_arn: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "archive-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_region() -> String {
    "ap-southeast-1".to_string()
}

fn default_processed_root() -> String {
    "ADMIN_RESULT".to_string()
}

fn default_media_extension() -> String {
    ".mp4".to_string()
}

fn default_target_timezone() -> String {
    "Asia/Ho_Chi_Minh".to_string()
}

fn default_assumed_source_timezone() -> String {
    "UTC".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_classification_endpoint() -> String {
    "https://e-space.vn/api/web/index.php/aws-s3-api/get-class-student".to_string()
}

fn default_owner_field() -> String {
    "teacher_name".to_string()
}

fn default_label_field() -> String {
    "start_date".to_string()
}

impl Config {
    /// Load configuration from `.env`, config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("service.name", "archive-service")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/archive").required(false))
            .add_source(config::File::with_name("/etc/archive/archive").required(false))
            // ARCHIVE__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("ARCHIVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.bucket".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.target_timezone()?;
        self.assumed_source_timezone()?;
        Ok(())
    }

    /// Zone used for derived names and log partitions
    pub fn target_timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone("relocation.target_timezone", &self.relocation.target_timezone)
    }

    /// Zone the container creation tag is interpreted in
    pub fn assumed_source_timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone(
            "relocation.assumed_source_timezone",
            &self.relocation.assumed_source_timezone,
        )
    }

    /// Policy ARN required by provisioning
    pub fn policy_arn(&self) -> Result<&str, ConfigError> {
        self.identity
            .policy_arn
            .as_deref()
            .filter(|arn| !arn.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "identity.policy_arn".to_string(),
                message: "required for provisioning".to_string(),
            })
    }
}

impl StorageConfig {
    /// Base URL for public object locators, without a trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com/{}", self.region, self.bucket),
        }
    }
}

fn parse_timezone(key: &str, value: &str) -> Result<Tz, ConfigError> {
    value.parse::<Tz>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            processed_root: default_processed_root(),
            media_extension: default_media_extension(),
            target_timezone: default_target_timezone(),
            assumed_source_timezone: default_assumed_source_timezone(),
            ffprobe_path: default_ffprobe_path(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classification_endpoint(),
            owner_field: default_owner_field(),
            label_field: default_label_field(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_config() -> StorageConfig {
        StorageConfig {
            bucket: "lecture-recordings".to_string(),
            region: "ap-southeast-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            public_base_url: None,
        }
    }

    fn config() -> Config {
        Config {
            service: ServiceConfig::default(),
            storage: storage_config(),
            relocation: RelocationConfig::default(),
            classification: ClassificationConfig::default(),
            identity: IdentityConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_processed_root(), "ADMIN_RESULT");
        assert_eq!(default_media_extension(), ".mp4");
        assert_eq!(default_owner_field(), "teacher_name");
        assert_eq!(default_label_field(), "start_date");
    }

    #[test]
    fn test_default_timezones_parse() {
        let config = config();
        assert_eq!(config.target_timezone().unwrap(), chrono_tz::Asia::Ho_Chi_Minh);
        assert_eq!(config.assumed_source_timezone().unwrap(), chrono_tz::UTC);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let mut config = config();
        config.relocation.target_timezone = "Mars/Olympus_Mons".to_string();

        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "relocation.target_timezone");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_public_base_url_defaults_to_regional_endpoint() {
        let storage = storage_config();
        assert_eq!(
            storage.public_base_url(),
            "https://s3.ap-southeast-1.amazonaws.com/lecture-recordings"
        );

        let mut custom = storage_config();
        custom.public_base_url = Some("https://cdn.example.com/".to_string());
        assert_eq!(custom.public_base_url(), "https://cdn.example.com");
    }

    #[test]
    fn test_policy_arn_required() {
        let mut config = config();
        assert!(config.policy_arn().is_err());

        config.identity.policy_arn = Some("arn:aws:iam::123456789012:policy/Uploader".to_string());
        assert_eq!(
            config.policy_arn().unwrap(),
            "arn:aws:iam::123456789012:policy/Uploader"
        );
    }
}
