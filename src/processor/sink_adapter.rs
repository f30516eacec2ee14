use crate::models::schema::header;
use crate::models::{InventoryRecord, Retailer, UpsertRecord};
use crate::processor::frame::{int_values_or_zero, text_values};
use crate::processor::normalizer::{normalize_date, normalize_isbn};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Stores melted unless configured otherwise. Youngpoong is opt-in.
pub const DEFAULT_BOOKSTORES: [Retailer; 3] = [Retailer::Kyobo, Retailer::Yes24, Retailer::Aladin];

/// Stock columns of an inventory export.
pub mod inventory_header {
    pub const ISBN: &str = "ISBN";
    pub const NORMAL: &str = "정상재고";
    pub const RETURN: &str = "반품재고";
    pub const HQ: &str = "본사재고";
    pub const LOGISTICS: &str = "물류재고";
}

/// Turns the wide integrated table into long-form store records.
#[derive(Debug, Clone)]
pub struct SinkAdapter {
    bookstores: Vec<Retailer>,
}

impl SinkAdapter {
    pub fn new(bookstores: Vec<Retailer>) -> Self {
        SinkAdapter { bookstores }
    }

    /// Build from store labels such as `교보` or `YES24`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let bookstores = labels
            .iter()
            .map(|label| {
                label
                    .as_ref()
                    .parse::<Retailer>()
                    .with_context(|| format!("Unknown bookstore label in sink config: {}", label.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(bookstores))
    }

    pub fn bookstores(&self) -> &[Retailer] {
        &self.bookstores
    }

    /// One record per (row, bookstore) with a positive quantity and a usable
    /// key, aggregated per (isbn, sale_date, bookstore).
    pub fn melt(&self, df: &DataFrame) -> Result<Vec<UpsertRecord>> {
        if df.height() == 0 {
            return Ok(Vec::new());
        }

        let dates = text_values(df, header::DATE)?;
        let isbns = text_values(df, header::ISBN)?;
        let prices = int_values_or_zero(df, header::PRICE)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for retailer in &self.bookstores {
            let quantities = int_values_or_zero(df, retailer.total_header())?;
            for row in 0..df.height() {
                let quantity = quantities[row];
                if quantity <= 0 {
                    continue;
                }
                let isbn = normalize_isbn(&isbns[row]);
                let sale_date = normalize_date(&dates[row]);
                if isbn.is_empty() || sale_date.is_empty() {
                    skipped += 1;
                    continue;
                }
                records.push(UpsertRecord {
                    isbn,
                    sale_date,
                    bookstore: retailer.store_label().to_string(),
                    quantity,
                    price: prices[row],
                });
            }
        }
        if skipped > 0 {
            debug!("Skipped {} sales cells without ISBN or date", skipped);
        }

        let melted = records.len();
        let records = Self::aggregate(records);
        info!("Melted {} sales cells into {} upsert records", melted, records.len());
        Ok(records)
    }

    /// Collapse duplicate keys: quantities are summed, the first price is kept.
    /// First-seen order is preserved.
    pub fn aggregate(records: Vec<UpsertRecord>) -> Vec<UpsertRecord> {
        let mut index: HashMap<(String, String, String), usize> = HashMap::new();
        let mut merged: Vec<UpsertRecord> = Vec::with_capacity(records.len());

        for record in records {
            let key = record.key();
            match index.get(&key) {
                Some(&position) => {
                    let existing = &mut merged[position];
                    existing.quantity = existing.quantity.saturating_add(record.quantity);
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(record);
                }
            }
        }
        merged
    }

    /// Inventory snapshot rows collapsed per ISBN, stock fields summed.
    pub fn inventory_records(&self, df: &DataFrame) -> Result<Vec<InventoryRecord>> {
        if df.height() == 0 {
            return Ok(Vec::new());
        }

        let isbns = text_values(df, inventory_header::ISBN)?;
        let normal = int_values_or_zero(df, inventory_header::NORMAL)?;
        let returned = int_values_or_zero(df, inventory_header::RETURN)?;
        let hq = int_values_or_zero(df, inventory_header::HQ)?;
        let logistics = int_values_or_zero(df, inventory_header::LOGISTICS)?;

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut records: Vec<InventoryRecord> = Vec::new();
        for row in 0..df.height() {
            let isbn = normalize_isbn(&isbns[row]);
            if isbn.is_empty() {
                continue;
            }
            match index.get(&isbn) {
                Some(&position) => {
                    let record = &mut records[position];
                    record.stock_normal = record.stock_normal.saturating_add(normal[row]);
                    record.stock_return = record.stock_return.saturating_add(returned[row]);
                    record.stock_hq = record.stock_hq.saturating_add(hq[row]);
                    record.stock_logistics = record.stock_logistics.saturating_add(logistics[row]);
                }
                None => {
                    index.insert(isbn.clone(), records.len());
                    records.push(InventoryRecord {
                        isbn,
                        stock_normal: normal[row],
                        stock_return: returned[row],
                        stock_hq: hq[row],
                        stock_logistics: logistics[row],
                    });
                }
            }
        }
        info!("Prepared {} inventory records from {} rows", records.len(), df.height());
        Ok(records)
    }
}

impl Default for SinkAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_BOOKSTORES.to_vec())
    }
}
