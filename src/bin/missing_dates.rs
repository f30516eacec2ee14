use anyhow::{Context, Result};
use book_sales_pipeline::config::{MinioConfig, PipelineConfig, pipeline_config::DEFAULT_CONFIG_PATH};
use book_sales_pipeline::models::{Retailer, RunClock};
use book_sales_pipeline::processor::ledger::missing_dates;
use book_sales_pipeline::storage::{MinioStorage, StorageManager, TableStore};
use std::env;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();

    // Without arguments every retailer is checked
    let retailers: Vec<Retailer> = match env::args().nth(1) {
        Some(arg) => vec![arg.parse()?],
        None => Retailer::ALL.to_vec(),
    };

    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH).context("Failed to load pipeline configuration")?;
    let clock = RunClock::now(config.clock.utc_offset_hours);
    let start = config.ledger.start()?;

    let minio_config =
        MinioConfig::from_file("src/configs/minio.toml").context("Failed to load MinIO configuration")?;
    let storage = MinioStorage::from_config(&minio_config).context("Failed to initialize MinIO storage")?;
    let keys = StorageManager::new(&config.storage);

    for retailer in retailers {
        let ledger = storage.load_table(&keys.ledger_key(retailer)).await?;
        let missing = missing_dates(ledger.as_ref(), start, &clock)?;

        if missing.is_empty() {
            info!("✅ {}: no missing dates since {}", retailer.display_name(), start);
            continue;
        }
        warn!("{}: {} missing dates since {}", retailer.display_name(), missing.len(), start);
        for date in missing {
            println!("{}\t{}", retailer.tag(), date);
        }
    }
    Ok(())
}
