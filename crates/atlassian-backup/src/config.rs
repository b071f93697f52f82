//! Atlassian backup config
//!

use core::{fmt, num::ParseIntError};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Shown in place of secrets in debug output.
pub(crate) const REDACTED: &str = "<redacted>";

/// The Atlassian cloud site config.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AtlassianConfig {
    /// The site url, e.g. `https://example.atlassian.net`.
    pub base_url: String,

    /// The account email the api token belongs to.
    pub email: String,

    /// The api token.
    pub api_token: String,

    /// Request timeout in seconds. Requests never time out when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl fmt::Debug for AtlassianConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlassianConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &REDACTED)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for AtlassianConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.atlassian.net".to_string(),
            email: String::new(),
            api_token: String::new(),
            timeout_seconds: None,
        }
    }
}

/// The object storage config.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// The bucket backups are kept in.
    pub bucket: String,

    /// The access key id.
    pub access_key: String,

    /// The secret access key.
    pub secret_key: String,

    /// The bucket region.
    pub region: String,

    /// A custom endpoint for S3 compatible services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Use path style addressing, required by some S3 compatible services.
    pub force_path_style: bool,

    /// The key prefix backups are uploaded under.
    pub prefix: String,

    /// How many of the newest objects remote pruning keeps.
    pub max_files: usize,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &REDACTED)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("prefix", &self.prefix)
            .field("max_files", &self.max_files)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            force_path_style: false,
            prefix: "atlassian_backups".to_string(),
            max_files: 4,
        }
    }
}

/// The backup config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// The directory archives are downloaded to.
    #[serde(default = "default_local_backup_directory")]
    pub local_backup_directory: PathBuf,

    /// The Atlassian site.
    #[serde(default)]
    pub atlassian: AtlassianConfig,

    /// The object storage.
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_local_backup_directory() -> PathBuf {
    PathBuf::from("./backup_files")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_backup_directory: default_local_backup_directory(),
            atlassian: AtlassianConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: &Path) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile);
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config = toml::from_str(&contents)?;

        Ok(config)
    }

    /// Loads the toml file if it exists, falling back to the defaults, then applies the
    /// environment overrides.
    pub fn load(file_path: &Path) -> Result<Self, LoadConfigError> {
        let mut config = match Self::load_toml(file_path) {
            Ok(config) => config,
            Err(LoadConfigError::NoFile) => {
                warn!("Config file {file_path:?} not found, using defaults");
                Self::default()
            }
            Err(error) => return Err(error),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Write this config to a toml file.
    pub fn save_toml(&self, file_path: &Path) -> Result<(), SaveConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(file_path, contents).map_err(SaveConfigError::Write)?;
        Ok(())
    }

    /// Override values with those returned from `lookup` for the known variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), LoadConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ATLASSIAN_URL") {
            self.atlassian.base_url = value;
        }
        if let Some(value) = lookup("ATLASSIAN_EMAIL") {
            self.atlassian.email = value;
        }
        if let Some(value) = lookup("ATLASSIAN_API_TOKEN") {
            self.atlassian.api_token = value;
        }
        if let Some(value) = lookup("BACKUP_BUCKET") {
            self.storage.bucket = value;
        }
        if let Some(value) = lookup("AWS_ACCESS_KEY_ID") {
            self.storage.access_key = value;
        }
        if let Some(value) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.storage.secret_key = value;
        }
        if let Some(value) = lookup("AWS_REGION") {
            self.storage.region = value;
        }
        if let Some(value) = lookup("BACKUP_S3_ENDPOINT") {
            self.storage.endpoint = Some(value);
        }
        if let Some(value) = lookup("BACKUP_DIRECTORY") {
            self.local_backup_directory = PathBuf::from(value);
        }
        if let Some(value) = lookup("BACKUP_MAX_FILES") {
            self.storage.max_files = value
                .trim()
                .parse()
                .map_err(|e| LoadConfigError::InvalidOverride("BACKUP_MAX_FILES", e))?;
        }

        Ok(())
    }

    /// Check the Atlassian section is usable.
    pub fn validate_atlassian(&self) -> Result<(), ValidateConfigError> {
        let atlassian = &self.atlassian;

        if !(atlassian.base_url.starts_with("https://") || atlassian.base_url.starts_with("http://"))
        {
            return Err(ValidateConfigError::InvalidBaseUrl(atlassian.base_url.clone()));
        }
        if atlassian.email.trim().is_empty() {
            return Err(ValidateConfigError::Missing("atlassian.email"));
        }
        if atlassian.api_token.trim().is_empty() {
            return Err(ValidateConfigError::Missing("atlassian.api_token"));
        }

        Ok(())
    }

    /// Check the storage section is usable.
    pub fn validate_storage(&self) -> Result<(), ValidateConfigError> {
        let storage = &self.storage;

        if storage.bucket.trim().is_empty() {
            return Err(ValidateConfigError::Missing("storage.bucket"));
        }
        if storage.access_key.trim().is_empty() {
            return Err(ValidateConfigError::Missing("storage.access_key"));
        }
        if storage.secret_key.trim().is_empty() {
            return Err(ValidateConfigError::Missing("storage.secret_key"));
        }
        if storage.prefix.trim_matches('/').is_empty() {
            return Err(ValidateConfigError::Missing("storage.prefix"));
        }
        if storage.max_files == 0 {
            return Err(ValidateConfigError::ZeroMaxFiles);
        }

        Ok(())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file does not exist.")]
    NoFile,

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Environment variable {0} is invalid: {1}")]
    InvalidOverride(&'static str, #[source] ParseIntError),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SaveConfigError {
    #[error("Failed to serialize the config:\n{0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write the file:\n{0}")]
    Write(#[source] io::Error),
}

#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateConfigError {
    #[error("`{0}` must be set")]
    Missing(&'static str),

    #[error("`atlassian.base_url` must be an http(s) url, found '{0}'")]
    InvalidBaseUrl(String),

    #[error("`storage.max_files` must be at least 1")]
    ZeroMaxFiles,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn complete() -> Config {
        let mut config = Config::default();
        config.atlassian.email = "backup@example.com".to_string();
        config.atlassian.api_token = "token".to_string();
        config.storage.bucket = "backups".to_string();
        config.storage.access_key = "access".to_string();
        config.storage.secret_key = "secret".to_string();
        config
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let contents = r#"
            [atlassian]
            base_url = "https://acme.atlassian.net"
            email = "ops@acme.test"
            api_token = "abc"

            [storage]
            bucket = "acme-backups"
        "#;

        let config: Config = toml::from_str(contents).unwrap();
        assert_eq!(config.atlassian.base_url, "https://acme.atlassian.net");
        assert_eq!(config.atlassian.timeout_seconds, None);
        assert_eq!(config.storage.bucket, "acme-backups");
        assert_eq!(config.storage.prefix, "atlassian_backups");
        assert_eq!(config.storage.max_files, 4);
        assert_eq!(config.local_backup_directory, PathBuf::from("./backup_files"));
    }

    #[test]
    fn default_round_trips_through_toml() {
        let config = complete();
        let contents = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn environment_overrides() {
        let variables: HashMap<&str, &str> = HashMap::from([
            ("ATLASSIAN_URL", "https://override.atlassian.net"),
            ("BACKUP_BUCKET", "override-bucket"),
            ("BACKUP_MAX_FILES", "7"),
            ("BACKUP_DIRECTORY", "/var/backups/atlassian"),
        ]);

        let mut config = complete();
        config
            .apply_overrides(|key| variables.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.atlassian.base_url, "https://override.atlassian.net");
        assert_eq!(config.atlassian.email, "backup@example.com");
        assert_eq!(config.storage.bucket, "override-bucket");
        assert_eq!(config.storage.max_files, 7);
        assert_eq!(
            config.local_backup_directory,
            PathBuf::from("/var/backups/atlassian")
        );
    }

    #[test]
    fn invalid_max_files_override() {
        let mut config = complete();
        let result = config.apply_overrides(|key| {
            (key == "BACKUP_MAX_FILES").then(|| "four".to_string())
        });

        assert!(matches!(
            result,
            Err(LoadConfigError::InvalidOverride("BACKUP_MAX_FILES", _))
        ));
    }

    #[test]
    fn debug_hides_secrets() {
        let mut config = complete();
        config.atlassian.api_token = "atlassian-api-token".to_string();
        config.storage.secret_key = "storage-secret-key".to_string();

        let debug = format!("{config:?}");
        assert!(!debug.contains("atlassian-api-token"));
        assert!(!debug.contains("storage-secret-key"));
        assert!(debug.contains("backup@example.com"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn validation() {
        let config = complete();
        assert_eq!(config.validate_atlassian(), Ok(()));
        assert_eq!(config.validate_storage(), Ok(()));

        let mut config = complete();
        config.atlassian.api_token = "  ".to_string();
        assert_eq!(
            config.validate_atlassian(),
            Err(ValidateConfigError::Missing("atlassian.api_token"))
        );

        let mut config = complete();
        config.atlassian.base_url = "example.atlassian.net".to_string();
        assert!(matches!(
            config.validate_atlassian(),
            Err(ValidateConfigError::InvalidBaseUrl(_))
        ));

        let mut config = complete();
        config.storage.max_files = 0;
        assert_eq!(
            config.validate_storage(),
            Err(ValidateConfigError::ZeroMaxFiles)
        );

        let config = Config::default();
        assert_eq!(
            config.validate_storage(),
            Err(ValidateConfigError::Missing("storage.bucket"))
        );
    }
}
