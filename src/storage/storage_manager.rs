use crate::config::StorageSection;
use crate::models::Retailer;

/// Object keys for the ledgers and the integrated table.
#[derive(Debug, Clone)]
pub struct StorageManager {
    ledger_prefix: String,
    integrated_key: String,
}

impl StorageManager {
    pub fn new(config: &StorageSection) -> Self {
        Self {
            ledger_prefix: config.ledger_prefix.trim_end_matches('/').to_string(),
            integrated_key: config.integrated_key.clone(),
        }
    }

    pub fn ledger_key(&self, retailer: Retailer) -> String {
        format!("{}/{}.parquet", self.ledger_prefix, retailer.tag())
    }

    pub fn integrated_key(&self) -> &str {
        &self.integrated_key
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new(&StorageSection::default())
    }
}
