//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted package size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Maximum number of files per bulk upload request.
    #[serde(default = "default_max_bulk_files")]
    pub max_bulk_files: usize,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::MAX_PACKAGE_SIZE
}

fn default_max_bulk_files() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            max_bulk_files: default_max_bulk_files(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for package binaries.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/uploads"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/depot.db"),
        }
    }
}

/// Authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing bearer tokens.
    /// WARNING: Prefer the DEPOT_AUTH__JWT_SECRET env var over storing this in a config file.
    pub jwt_secret: String,
    /// Bearer token lifetime in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// bcrypt cost factor for password hashing.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_token_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_bcrypt_cost() -> u32 {
    12
}

impl AuthConfig {
    /// Create a test configuration with a fixed secret and a cheap hash cost.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            jwt_secret: "depot-test-secret-not-for-production".to_string(),
            token_ttl_secs: default_token_ttl_secs(),
            // bcrypt at production cost dominates test runtime; 4 is the crate minimum.
            bcrypt_cost: 4,
        }
    }

    /// Validate authentication configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < 16 {
            return Err(
                "auth.jwt_secret must be at least 16 characters; generate one with \
                 `head -c 32 /dev/urandom | base64`"
                    .to_string(),
            );
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(format!(
                "auth.bcrypt_cost {} out of range (4..=31)",
                self.bcrypt_cost
            ));
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Authentication configuration (required).
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a fixed signing secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            auth: AuthConfig::for_testing(),
        }
    }

    /// Validate configuration invariants across sections.
    pub fn validate(&self) -> Result<(), String> {
        self.auth.validate()?;
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes cannot be 0".to_string());
        }
        if self.server.max_bulk_files == 0 {
            return Err("server.max_bulk_files cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_bytes, crate::MAX_PACKAGE_SIZE);
        assert_eq!(config.max_bulk_files, 10);
    }

    #[test]
    fn test_auth_config_rejects_short_secret() {
        let mut config = AuthConfig::for_testing();
        config.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_config_rejects_bad_cost() {
        let mut config = AuthConfig::for_testing();
        config.bcrypt_cost = 2;
        assert!(config.validate().is_err());
        config.bcrypt_cost = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_for_testing_validates() {
        assert!(AppConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"type":"filesystem","path":"/tmp/blobs"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        let StorageConfig::Filesystem { path } = config;
        assert_eq!(path, PathBuf::from("/tmp/blobs"));
    }
}
