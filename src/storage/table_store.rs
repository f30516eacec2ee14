use anyhow::{Context, Result};
use async_trait::async_trait;
use polars::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Keyed table persistence: ledgers and the integrated table.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// `None` when nothing has been stored under `key` yet.
    async fn load_table(&self, key: &str) -> Result<Option<DataFrame>>;

    /// Replace whatever is stored under `key` with `df`.
    async fn replace_table(&self, key: &str, df: &mut DataFrame) -> Result<()>;
}

pub fn encode_parquet(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let writer = ParquetWriter::new(&mut buf);
        writer.finish(df).context("Failed to encode table as parquet")?;
    }
    Ok(buf)
}

pub fn decode_parquet(bytes: Vec<u8>) -> Result<DataFrame> {
    ParquetReader::new(Cursor::new(bytes))
        .finish()
        .context("Failed to decode parquet table")
}

/// Tables kept as parquet bytes in memory, for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn load_table(&self, key: &str) -> Result<Option<DataFrame>> {
        let bytes = self.objects.read().await.get(key).cloned();
        match bytes {
            Some(bytes) => {
                debug!("Loaded {} bytes from memory key {}", bytes.len(), key);
                Ok(Some(decode_parquet(bytes)?))
            }
            None => Ok(None),
        }
    }

    async fn replace_table(&self, key: &str, df: &mut DataFrame) -> Result<()> {
        let bytes = encode_parquet(df)?;
        info!("Stored {} rows in memory at {}", df.height(), key);
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }
}
