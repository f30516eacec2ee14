use anyhow::{Context, Result};
use book_sales_pipeline::config::{MinioConfig, PipelineConfig, pipeline_config::DEFAULT_CONFIG_PATH};
use book_sales_pipeline::models::RunClock;
use book_sales_pipeline::pipeline::{self, Reconciler};
use book_sales_pipeline::processor::SinkAdapter;
use book_sales_pipeline::sink::{RecordingSink, SalesSink, SupabaseConfig, SupabaseSink};
use book_sales_pipeline::storage::{MinioStorage, StorageManager, TableStore};
use std::env;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();

    let sync = env::args().any(|arg| arg == "--sync");
    let dry_run = env::args().any(|arg| arg == "--dry-run" || arg == "-n");

    let run_id = Uuid::new_v4();
    let span = info_span!("run", run_id = %run_id);
    run(sync, dry_run).instrument(span).await
}

async fn run(sync: bool, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("🚀 Starting book sales reconciliation (dry run, nothing is written)");
    } else {
        info!("🚀 Starting book sales reconciliation");
    }

    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH).context("Failed to load pipeline configuration")?;
    let clock = RunClock::now(config.clock.utc_offset_hours);
    info!("Run time {} (UTC{:+})", clock.timestamp(), config.clock.utc_offset_hours);

    // Resolve every credential before any data is touched
    let sink: Option<Box<dyn SalesSink>> = match (sync, dry_run) {
        (false, _) => None,
        (true, true) => Some(Box::new(RecordingSink::new())),
        (true, false) => {
            let sink_config =
                SupabaseConfig::from_section(&config.sink).context("Failed to load sink configuration")?;
            info!("Sync target: {}", sink_config.url);
            Some(Box::new(SupabaseSink::new(sink_config)?))
        }
    };
    let adapter = SinkAdapter::from_labels(&config.sink.bookstores)?;

    let minio_config =
        MinioConfig::from_file("src/configs/minio.toml").context("Failed to load MinIO configuration")?;
    info!("Loaded MinIO configuration: {}@{}", minio_config.endpoint, minio_config.bucket_name);

    let storage = MinioStorage::from_config(&minio_config)
        .context("Failed to initialize MinIO storage")
        .with_context(|| "Please ensure MinIO server is running and MINIO_ACCESS_KEY/MINIO_SECRET_KEY are set")?;
    storage.ensure_bucket().await?;

    let keys = StorageManager::new(&config.storage);
    let reconciler = Reconciler::from_config(&config);
    let result = pipeline::run(&storage, &keys, &reconciler, &clock, dry_run).await?;
    debug!("Run summary: {}", serde_json::to_string(&result.summary)?);

    for usage in &result.usage {
        if usage.unresolved > 0 {
            warn!("{}: {} rows left empty after all fallbacks", usage.header, usage.unresolved);
        }
    }

    if let Some(sink) = sink {
        let inventory = storage.load_table(&config.ledger.inventory_key).await.unwrap_or_else(|e| {
            warn!("Inventory snapshot unavailable, skipping: {:#}", e);
            None
        });

        let (sales, inventory) = pipeline::sync_to_sink(
            &result.table,
            inventory.as_ref(),
            &adapter,
            sink.as_ref(),
            config.sink.chunk_size,
        )
        .await?;

        if sales.is_complete() {
            info!("✅ Synced {} sales records", sales.records_sent);
        } else {
            warn!(
                "❌ Sales sync incomplete: {} records in {} chunks failed",
                sales.records_failed, sales.failed_chunks
            );
        }
        if let Some(report) = inventory {
            info!("Inventory sync: {} sent, {} failed", report.records_sent, report.records_failed);
        }
    }

    info!("\n🎉 Reconciliation complete: {} rows, {} units", result.summary.rows, result.summary.grand_total);
    Ok(())
}
