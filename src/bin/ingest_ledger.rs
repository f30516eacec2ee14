use anyhow::{Context, Result, anyhow};
use book_sales_pipeline::config::{MinioConfig, PipelineConfig, pipeline_config::DEFAULT_CONFIG_PATH};
use book_sales_pipeline::models::{Retailer, RunClock};
use book_sales_pipeline::pipeline::ingest_batch;
use book_sales_pipeline::processor::ledger::{describe, grid_to_frame, read_grid_file};
use book_sales_pipeline::processor::{LedgerWriter, RetentionPolicy};
use book_sales_pipeline::storage::{MinioStorage, StorageManager};
use chrono::NaiveDate;
use std::env;
use std::path::Path;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

const USAGE: &str = "usage: ingest_ledger <kyobo|aladin|youngpoong|yes24> <export.csv> [--date YYYY-MM-DD]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let span = info_span!("ingest", run_id = %Uuid::new_v4());
    run(args).instrument(span).await
}

async fn run(args: Vec<String>) -> Result<()> {
    let retailer: Retailer = args.first().ok_or_else(|| anyhow!(USAGE))?.parse()?;
    let path = args.get(1).ok_or_else(|| anyhow!(USAGE))?;

    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH).context("Failed to load pipeline configuration")?;
    let clock = RunClock::now(config.clock.utc_offset_hours);

    let query_date = match args.iter().position(|arg| arg == "--date") {
        Some(index) => {
            let raw = args.get(index + 1).ok_or_else(|| anyhow!(USAGE))?;
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Invalid --date: {}", raw))?
        }
        None => clock.yesterday(),
    };

    let minio_config =
        MinioConfig::from_file("src/configs/minio.toml").context("Failed to load MinIO configuration")?;
    let storage = MinioStorage::from_config(&minio_config).context("Failed to initialize MinIO storage")?;
    storage.ensure_bucket().await?;

    info!("📥 Ingesting {} export {} for {}", retailer.display_name(), path, query_date);

    // Every cell is read as text; the header row is located afterwards
    let grid = read_grid_file(Path::new(path))?;
    let batch = grid_to_frame(&grid)?;
    info!("Cleaned export: {}", describe(&batch));

    let keys = StorageManager::new(&config.storage);
    let writer = LedgerWriter::new(RetentionPolicy::new(config.retention.days));
    let warnings = ingest_batch(&storage, &keys, &writer, retailer, batch, query_date, &clock).await?;

    if warnings.is_empty() {
        info!("✅ {} ledger updated", retailer.display_name());
    } else {
        warn!("⚠ {} ledger updated with {} warnings", retailer.display_name(), warnings.len());
        for warning in &warnings {
            warn!("  - {}", warning);
        }
    }
    Ok(())
}
