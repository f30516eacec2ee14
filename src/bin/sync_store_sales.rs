use anyhow::{Context, Result, anyhow};
use book_sales_pipeline::config::{MinioConfig, PipelineConfig, pipeline_config::DEFAULT_CONFIG_PATH};
use book_sales_pipeline::pipeline::sync_to_sink;
use book_sales_pipeline::processor::SinkAdapter;
use book_sales_pipeline::sink::{SupabaseConfig, SupabaseSink};
use book_sales_pipeline::storage::{MinioStorage, StorageManager, TableStore};
use std::env;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();

    let skip_inventory = env::args().any(|arg| arg == "--sales-only");
    let span = info_span!("sync", run_id = %Uuid::new_v4());
    run(skip_inventory).instrument(span).await
}

async fn run(skip_inventory: bool) -> Result<()> {
    info!("🚀 Syncing integrated sales table to the downstream store");

    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH).context("Failed to load pipeline configuration")?;
    let sink_config = SupabaseConfig::from_section(&config.sink).context("Failed to load sink configuration")?;
    let sink = SupabaseSink::new(sink_config)?;
    let adapter = SinkAdapter::from_labels(&config.sink.bookstores)?;

    let minio_config =
        MinioConfig::from_file("src/configs/minio.toml").context("Failed to load MinIO configuration")?;
    let storage = MinioStorage::from_config(&minio_config).context("Failed to initialize MinIO storage")?;

    let keys = StorageManager::new(&config.storage);
    let table = storage
        .load_table(keys.integrated_key())
        .await?
        .ok_or_else(|| anyhow!("No integrated table at {}; run book-sales-pipeline first", keys.integrated_key()))?;
    info!("Loaded integrated table with {} rows", table.height());

    let inventory = if skip_inventory {
        None
    } else {
        match storage.load_table(&config.ledger.inventory_key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Inventory snapshot unavailable, skipping: {:#}", e);
                None
            }
        }
    };

    let (sales, inventory) =
        sync_to_sink(&table, inventory.as_ref(), &adapter, &sink, config.sink.chunk_size).await?;

    info!("\n=== SYNC SUMMARY ===");
    info!("Sales: {} sent, {} failed ({} of {} chunks failed)", sales.records_sent, sales.records_failed, sales.failed_chunks, sales.chunks);
    if let Some(report) = &inventory {
        info!("Inventory: {} sent, {} failed", report.records_sent, report.records_failed);
    }

    if sales.is_complete() && inventory.as_ref().is_none_or(|r| r.is_complete()) {
        info!("✅ Sync complete");
    } else {
        error!("❌ Some chunks failed; rerun to retry, upserts are idempotent");
    }
    Ok(())
}
