use crate::config::MinioConfig;
use crate::storage::table_store::{TableStore, decode_parquet, encode_parquet};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use polars::prelude::DataFrame;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::info;

pub struct MinioStorage {
    bucket: Bucket,
}

impl MinioStorage {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, bucket_name: &str) -> Result<Self> {
        let region = Region::Custom {
            region: "us-east-1".to_owned(),
            endpoint: endpoint.to_owned(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;

        let bucket = Bucket::new(bucket_name, region, credentials)?;

        // MinIO needs path-style addressing
        let bucket = *bucket.with_path_style();

        Ok(MinioStorage { bucket })
    }

    pub fn from_config(config: &MinioConfig) -> Result<Self> {
        config.validate()?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let keys = config.credentials()?;
        let credentials = Credentials::new(Some(&keys.access_key), Some(&keys.secret_key), None, None, None)?;

        let bucket = Bucket::new(&config.bucket_name, region, credentials)?;

        let bucket = if config.path_style {
            *bucket.with_path_style()
        } else {
            *bucket
        };

        Ok(MinioStorage { bucket })
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.bucket.exists().await {
            Ok(true) => {
                info!("Bucket '{}' already exists", self.bucket.name);
            }
            Ok(false) => {
                let config = s3::BucketConfiguration::default();
                let response = s3::Bucket::create(
                    &self.bucket.name,
                    self.bucket.region.clone(),
                    self.bucket.credentials().await?,
                    config,
                )
                .await;
                match response {
                    Ok(_) => {
                        info!("Created bucket: {}", self.bucket.name);
                    }
                    Err(e) => {
                        return Err(anyhow!("Failed to create bucket: {}", e));
                    }
                }
            }
            Err(e) => {
                return Err(anyhow!("Failed to check bucket existence: {}", e));
            }
        }
        Ok(())
    }

    pub async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let response = self.bucket.put_object(key, data).await?;

        if response.status_code() == 200 {
            info!("Stored object: {} ({} bytes)", key, data.len());
            Ok(())
        } else {
            Err(anyhow!("Failed to store object {}: HTTP {}", key, response.status_code()))
        }
    }

    /// Object bytes, or `None` when the key does not exist.
    pub async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 200 => Ok(Some(response.bytes().to_vec())),
            Ok(response) if response.status_code() == 404 => Ok(None),
            Ok(response) => Err(anyhow!("Failed to get object {}: HTTP {}", key, response.status_code())),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(anyhow!("Failed to get object {}: {}", key, e)),
        }
    }

    pub fn get_bucket_name(&self) -> &str {
        &self.bucket.name
    }
}

#[async_trait]
impl TableStore for MinioStorage {
    async fn load_table(&self, key: &str) -> Result<Option<DataFrame>> {
        let Some(bytes) = self.get_object(key).await? else {
            return Ok(None);
        };
        let df = decode_parquet(bytes).with_context(|| format!("Corrupt table at {}", key))?;
        info!("Loaded {} rows from {}", df.height(), key);
        Ok(Some(df))
    }

    async fn replace_table(&self, key: &str, df: &mut DataFrame) -> Result<()> {
        let bytes = encode_parquet(df)?;
        self.put_object(key, &bytes)
            .await
            .with_context(|| format!("Failed to replace table at {}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use std::env;

    #[test]
    fn test_minio_client_creation() {
        let result = MinioStorage::new("http://localhost:9000", "test_access_key", "test_secret_key", "book-sales");
        assert!(result.is_ok());
    }

    #[test]
    fn test_minio_from_config() {
        let config = MinioConfig::default().with_credentials("test_access", "test_secret");

        let storage = MinioStorage::from_config(&config).unwrap();
        assert_eq!(storage.get_bucket_name(), "book-sales");
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = MinioConfig::default();
        assert!(MinioStorage::from_config(&config).is_err());
    }

    #[tokio::test]
    #[ignore] // Run with --ignored flag for integration tests
    async fn test_table_round_trip() {
        // Requires a running MinIO instance
        if env::var("MINIO_TEST_ENABLED").is_err() {
            return;
        }

        let storage = MinioStorage::new("http://localhost:9000", "minioadmin", "minioadmin", "book-sales-test").unwrap();
        storage.ensure_bucket().await.unwrap();

        let mut df = df!("ISBN" => ["9791234567890"], "판매수량" => ["3"]).unwrap();
        storage.replace_table("ledgers/test.parquet", &mut df).await.unwrap();

        let loaded = storage.load_table("ledgers/test.parquet").await.unwrap().unwrap();
        assert!(loaded.equals(&df));
        assert!(storage.load_table("ledgers/absent.parquet").await.unwrap().is_none());
    }
}
