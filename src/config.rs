//! Configuration parsing and structures

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::provisioner::ProvisionerSettings;
use crate::sequencer::TEMP_MOUNT_PATH_PREFIX;

/// Tag key prefix reserved by AWS
const RESERVED_TAG_PREFIX: &str = "aws:";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Control-plane client settings
    #[serde(default)]
    pub aws: AwsConfig,

    /// Settings shared by both provisioning strategies
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// AWS client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region. The SDK's default provider chain decides when unset.
    pub region: Option<String>,

    /// Session name used when assuming a cross-account role
    #[serde(default = "default_role_session_name")]
    pub role_session_name: String,
}

fn default_role_session_name() -> String {
    "efs-provisioner".to_string()
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: None,
            role_session_name: default_role_session_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Extra tags applied to every access point
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Remove an access point's root directory when deleting the access point
    #[serde(default)]
    pub delete_access_point_root_dir: bool,

    /// Parent directory of the scratch mount points
    #[serde(default = "default_temp_mount_path")]
    pub temp_mount_path: PathBuf,
}

fn default_temp_mount_path() -> PathBuf {
    PathBuf::from(TEMP_MOUNT_PATH_PREFIX)
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            tags: HashMap::new(),
            delete_access_point_root_dir: false,
            temp_mount_path: default_temp_mount_path(),
        }
    }
}

impl ProvisioningConfig {
    pub fn settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            tags: self.tags.clone(),
            delete_access_point_root_dir: self.delete_access_point_root_dir,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temp_mount_path = &self.provisioning.temp_mount_path;
        if !temp_mount_path.is_absolute() {
            return Err(ConfigError::ValidationError(format!(
                "provisioning.temp_mount_path must be absolute, got {:?}",
                temp_mount_path
            )));
        }

        for key in self.provisioning.tags.keys() {
            if key.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "provisioning.tags: tag keys cannot be empty".to_string(),
                ));
            }
            if key
                .get(..RESERVED_TAG_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_TAG_PREFIX))
            {
                return Err(ConfigError::ValidationError(format!(
                    "provisioning.tags: tag key {:?} uses the reserved {:?} prefix",
                    key, RESERVED_TAG_PREFIX
                )));
            }
        }

        if self.aws.role_session_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "aws.role_session_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
