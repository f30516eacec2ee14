use crate::models::Retailer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Daily sales row as written to the downstream store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertRecord {
    pub isbn: String,
    pub sale_date: String,
    pub bookstore: String,
    pub quantity: i64,
    pub price: i64,
}

impl UpsertRecord {
    /// Conflict key of the sales table: (isbn, sale_date, bookstore).
    pub fn key(&self) -> (String, String, String) {
        (self.isbn.clone(), self.sale_date.clone(), self.bookstore.clone())
    }
}

/// Stock snapshot per ISBN, keyed by `isbn` in the downstream store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub isbn: String,
    pub stock_normal: i64,
    pub stock_return: i64,
    pub stock_hq: i64,
    pub stock_logistics: i64,
}

/// Figures reported after a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rows: usize,
    pub grand_total: i64,
    pub retailer_totals: BTreeMap<Retailer, i64>,
    pub kyobo_offline: i64,
    pub kyobo_online: i64,
    pub kyobo_corporate: i64,
    pub dropped_by_retention: usize,
    pub generated_at: String,
}

impl RunSummary {
    pub fn log(&self) {
        info!("=== Integrated table summary ===");
        info!("Rows: {}", self.rows);
        info!("Total units sold: {}", self.grand_total);
        info!("Rows dropped by retention: {}", self.dropped_by_retention);
        info!("Generated at: {}", self.generated_at);
        for retailer in Retailer::ALL {
            let total = self.retailer_totals.get(&retailer).copied().unwrap_or(0);
            if retailer == Retailer::Kyobo {
                info!(
                    "  {}: {} (offline {} + online {} + corporate {})",
                    retailer.total_header(),
                    total,
                    self.kyobo_offline,
                    self.kyobo_online,
                    self.kyobo_corporate
                );
            } else {
                info!("  {}: {}", retailer.total_header(), total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_record_serializes_with_store_field_names() {
        let record = UpsertRecord {
            isbn: "9791234567890".to_string(),
            sale_date: "2026-01-10".to_string(),
            bookstore: "YES24".to_string(),
            quantity: 7,
            price: 18000,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["isbn"], "9791234567890");
        assert_eq!(value["sale_date"], "2026-01-10");
        assert_eq!(value["bookstore"], "YES24");
        assert_eq!(value["quantity"], 7);
        assert_eq!(value["price"], 18000);
        assert_eq!(
            record.key(),
            ("9791234567890".to_string(), "2026-01-10".to_string(), "YES24".to_string())
        );
    }
}
