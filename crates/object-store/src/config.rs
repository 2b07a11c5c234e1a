//! Configuration for the encrypted object store.
//!
//! Read once at startup (typically from a TOML file) and immutable afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::MasterSecret;
use crate::error::{Result, StorageError};

fn default_bucket() -> String {
    "sealbin".to_string()
}

/// Configuration for the blob storage backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory storage (for testing)
    Memory {
        #[serde(default = "default_bucket")]
        bucket: String,
    },

    /// Local filesystem storage
    Local {
        /// Path to the storage directory; the bucket is a subdirectory
        path: PathBuf,
        #[serde(default = "default_bucket")]
        bucket: String,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            bucket: default_bucket(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Memory { bucket } => {
                f.debug_struct("Memory").field("bucket", bucket).finish()
            }
            BackendConfig::Local { path, bucket } => f
                .debug_struct("Local")
                .field("path", path)
                .field("bucket", bucket)
                .finish(),
            BackendConfig::S3 {
                endpoint,
                access_key,
                bucket,
                region,
                ..
            } => f
                .debug_struct("S3")
                .field("endpoint", endpoint)
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .field("bucket", bucket)
                .field("region", region)
                .finish(),
        }
    }
}

impl BackendConfig {
    pub fn bucket(&self) -> &str {
        match self {
            BackendConfig::Memory { bucket }
            | BackendConfig::Local { bucket, .. }
            | BackendConfig::S3 { bucket, .. } => bucket,
        }
    }
}

/// Everything the storage adapter needs at construction.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Blob storage backend
    #[serde(default)]
    pub backend: BackendConfig,
    /// Master secret as raw text
    #[serde(default)]
    pub master_secret: Option<String>,
    /// Master secret as hex, for secrets that are not valid text
    #[serde(default)]
    pub master_secret_hex: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("master_secret", &"<redacted>")
            .finish()
    }
}

impl StorageConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StorageError::Configuration(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build the master secret, validating its length.
    pub fn master_secret(&self) -> Result<MasterSecret> {
        match (&self.master_secret, &self.master_secret_hex) {
            (Some(_), Some(_)) => Err(StorageError::Configuration(
                "set only one of master_secret and master_secret_hex".to_string(),
            )),
            (Some(secret), None) => MasterSecret::new(secret.as_bytes()),
            (None, Some(hex)) => MasterSecret::from_hex(hex),
            (None, None) => Err(StorageError::Configuration(
                "missing master secret".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MIN_MASTER_SECRET_SIZE;

    #[test]
    fn test_parse_s3_config() {
        let secret = "k".repeat(MIN_MASTER_SECRET_SIZE);
        let toml = format!(
            r#"
            master_secret = "{}"

            [backend]
            type = "s3"
            endpoint = "http://localhost:9000"
            access_key = "minioadmin"
            secret_key = "minioadmin"
            bucket = "filebin"
            "#,
            secret
        );

        let config = StorageConfig::from_toml_str(&toml).unwrap();
        match &config.backend {
            BackendConfig::S3 {
                endpoint, region, ..
            } => {
                assert_eq!(endpoint, "http://localhost:9000");
                assert!(region.is_none());
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(config.backend.bucket(), "filebin");
        assert!(config.master_secret().is_ok());
    }

    #[test]
    fn test_parse_local_config_defaults_bucket() {
        let toml = r#"
            master_secret_hex = "00"

            [backend]
            type = "local"
            path = "/var/lib/sealbin"
        "#;

        let config = StorageConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.backend.bucket(), "sealbin");
        // One byte of hex is far too short
        assert!(matches!(
            config.master_secret(),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_backend_is_memory() {
        let config = StorageConfig::from_toml_str("").unwrap();
        assert!(matches!(config.backend, BackendConfig::Memory { .. }));
        assert!(config.master_secret().is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let toml = r#"
            [backend]
            type = "ftp"
        "#;
        assert!(matches!(
            StorageConfig::from_toml_str(toml),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_both_secrets_rejected() {
        let config = StorageConfig {
            master_secret: Some("a".repeat(MIN_MASTER_SECRET_SIZE)),
            master_secret_hex: Some("ab".repeat(MIN_MASTER_SECRET_SIZE)),
            ..Default::default()
        };
        assert!(config.master_secret().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = StorageConfig {
            backend: BackendConfig::S3 {
                endpoint: "http://localhost:9000".to_string(),
                access_key: "access".to_string(),
                secret_key: "hunter2".to_string(),
                bucket: "b".to_string(),
                region: None,
            },
            master_secret: Some("topsecret".repeat(8)),
            master_secret_hex: None,
        };

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("access"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\ntype = \"memory\"\nbucket = \"t\"\n").unwrap();

        let config = StorageConfig::load(&path).unwrap();
        assert_eq!(config.backend.bucket(), "t");

        assert!(StorageConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
