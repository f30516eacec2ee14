//! Object store settings for the ledger and integrated tables.
//!
//! Endpoint and bucket come from `[minio]` in a toml file; the access and
//! secret keys only ever come from the environment.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::env;
use std::fmt;

pub const DEFAULT_ACCESS_KEY_VAR: &str = "MINIO_ACCESS_KEY";
pub const DEFAULT_SECRET_KEY_VAR: &str = "MINIO_SECRET_KEY";

#[derive(Debug, Deserialize)]
struct MinioFile {
    minio: MinioConfig,
}

#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    #[serde(default = "default_bucket")]
    pub bucket_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// MinIO serves buckets under the path, not a subdomain.
    #[serde(default = "default_path_style")]
    pub path_style: bool,
    #[serde(default = "default_access_key_var")]
    pub env_access_key: String,
    #[serde(default = "default_secret_key_var")]
    pub env_secret_key: String,
    #[serde(skip)]
    credentials: Option<StoreCredentials>,
}

fn default_bucket() -> String {
    "book-sales".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_path_style() -> bool {
    true
}

fn default_access_key_var() -> String {
    DEFAULT_ACCESS_KEY_VAR.to_string()
}

fn default_secret_key_var() -> String {
    DEFAULT_SECRET_KEY_VAR.to_string()
}

impl MinioConfig {
    /// Read the `[minio]` section and pull credentials from the environment.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read MinIO config file: {}", path))?;

        let file: MinioFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse MinIO config file: {}", path))?;

        let mut config = file.minio;
        config.load_credentials()?;
        Ok(config)
    }

    pub fn load_credentials(&mut self) -> Result<()> {
        let access_key = env::var(&self.env_access_key)
            .with_context(|| format!("Missing environment variable: {}", self.env_access_key))?;
        let secret_key = env::var(&self.env_secret_key)
            .with_context(|| format!("Missing environment variable: {}", self.env_secret_key))?;

        self.credentials = Some(StoreCredentials { access_key, secret_key });
        Ok(())
    }

    pub fn with_credentials(mut self, access_key: &str, secret_key: &str) -> Self {
        self.credentials = Some(StoreCredentials {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        });
        self
    }

    pub fn credentials(&self) -> Result<&StoreCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| anyhow!("MinIO credentials not loaded"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(anyhow!("MinIO endpoint cannot be empty"));
        }
        if self.bucket_name.is_empty() {
            return Err(anyhow!("MinIO bucket name cannot be empty"));
        }
        self.credentials()?;
        Ok(())
    }
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket_name: default_bucket(),
            region: default_region(),
            path_style: default_path_style(),
            env_access_key: default_access_key_var(),
            env_secret_key: default_secret_key_var(),
            credentials: None,
        }
    }
}
