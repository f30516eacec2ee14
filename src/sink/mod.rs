pub mod supabase;

pub use supabase::{SupabaseConfig, SupabaseSink};

use crate::models::{InventoryRecord, UpsertRecord};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Downstream relational store receiving the daily sales and inventory.
#[async_trait]
pub trait SalesSink: Send + Sync {
    /// Upsert one chunk keyed on (isbn, sale_date, bookstore).
    async fn upsert_sales(&self, chunk: &[UpsertRecord]) -> Result<()>;

    /// Upsert one chunk keyed on isbn.
    async fn upsert_inventory(&self, chunk: &[InventoryRecord]) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub chunks: usize,
    pub failed_chunks: usize,
    pub records_sent: usize,
    pub records_failed: usize,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }
}

/// Send records in chunks; a failed chunk is logged and counted, and the
/// next chunk proceeds.
async fn push_chunks<'a, T, F, Fut>(label: &str, records: &'a [T], chunk_size: usize, mut upsert: F) -> SyncReport
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut report = SyncReport::default();
    if records.is_empty() {
        info!("No {} records to sync", label);
        return report;
    }

    let chunk_size = chunk_size.max(1);
    let total_chunks = records.len().div_ceil(chunk_size);
    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        report.chunks += 1;
        match upsert(chunk).await {
            Ok(()) => {
                report.records_sent += chunk.len();
                info!("{} chunk {}/{}: {} records upserted", label, index + 1, total_chunks, chunk.len());
            }
            Err(e) => {
                report.failed_chunks += 1;
                report.records_failed += chunk.len();
                error!("{} chunk {}/{} failed: {:#}", label, index + 1, total_chunks, e);
            }
        }
    }

    info!(
        "{} sync finished: {} sent, {} failed in {} of {} chunks",
        label, report.records_sent, report.records_failed, report.failed_chunks, report.chunks
    );
    report
}

pub async fn push_sales(sink: &dyn SalesSink, records: &[UpsertRecord], chunk_size: usize) -> SyncReport {
    push_chunks("Sales", records, chunk_size, |chunk| sink.upsert_sales(chunk)).await
}

pub async fn push_inventory(sink: &dyn SalesSink, records: &[InventoryRecord], chunk_size: usize) -> SyncReport {
    push_chunks("Inventory", records, chunk_size, |chunk| sink.upsert_inventory(chunk)).await
}

/// Sink that keeps what it receives instead of sending it. Used for dry runs.
#[derive(Default)]
pub struct RecordingSink {
    sales: Mutex<Vec<UpsertRecord>>,
    inventory: Mutex<Vec<InventoryRecord>>,
    calls: Mutex<usize>,
    failing_calls: HashSet<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given zero-based upsert calls.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_calls: calls.into_iter().collect(),
            ..Self::default()
        }
    }

    pub async fn sales(&self) -> Vec<UpsertRecord> {
        self.sales.lock().await.clone()
    }

    pub async fn inventory(&self) -> Vec<InventoryRecord> {
        self.inventory.lock().await.clone()
    }

    async fn next_call(&self) -> Result<()> {
        let mut calls = self.calls.lock().await;
        let call = *calls;
        *calls += 1;
        if self.failing_calls.contains(&call) {
            return Err(anyhow!("simulated failure on upsert call {}", call));
        }
        Ok(())
    }
}

#[async_trait]
impl SalesSink for RecordingSink {
    async fn upsert_sales(&self, chunk: &[UpsertRecord]) -> Result<()> {
        self.next_call().await?;
        self.sales.lock().await.extend_from_slice(chunk);
        Ok(())
    }

    async fn upsert_inventory(&self, chunk: &[InventoryRecord]) -> Result<()> {
        self.next_call().await?;
        self.inventory.lock().await.extend_from_slice(chunk);
        Ok(())
    }
}
