use crate::models::schema::{CANONICAL_COLUMNS, header};
use crate::models::{Retailer, RunClock};
use crate::processor::frame::{filter_rows, int_column, int_values_or_zero, text_values};
use crate::processor::normalizer::parse_date;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use tracing::{debug, info};

pub const DEFAULT_RETENTION_DAYS: i64 = 1095;

/// Rolling retention window measured back from the run date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub days: i64,
}

impl RetentionPolicy {
    pub fn new(days: i64) -> Self {
        Self { days }
    }

    /// Oldest date kept. A window reaching past the calendar keeps everything.
    pub fn cutoff(&self, clock: &RunClock) -> NaiveDate {
        Duration::try_days(self.days)
            .and_then(|window| clock.today().checked_sub_signed(window))
            .unwrap_or(NaiveDate::MIN)
    }

    /// A row survives on its upload date when that parses, otherwise on its
    /// sale date. Rows with neither are dropped.
    pub fn retains(&self, upload_date: &str, sale_date: &str, cutoff: NaiveDate) -> bool {
        match parse_date(upload_date).or_else(|| parse_date(sale_date)) {
            Some(date) => date >= cutoff,
            None => false,
        }
    }

    /// Filter a frame on the given upload/sale date columns. A missing sale
    /// column is treated as empty.
    pub fn apply(
        &self,
        df: &DataFrame,
        upload_column: &str,
        sale_column: &str,
        clock: &RunClock,
    ) -> Result<(DataFrame, usize)> {
        if df.height() == 0 {
            return Ok((df.clone(), 0));
        }

        let cutoff = self.cutoff(clock);
        let uploads = column_or_empty(df, upload_column)?;
        let sales = column_or_empty(df, sale_column)?;
        let keep: Vec<bool> = uploads
            .iter()
            .zip(&sales)
            .map(|(upload, sale)| self.retains(upload, sale, cutoff))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();

        debug!("Retention cutoff {} ({} days): {} rows dropped", cutoff, self.days, dropped);
        Ok((filter_rows(df, &keep)?, dropped))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

fn column_or_empty(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    match df.column(name) {
        Ok(_) => text_values(df, name),
        Err(_) => Ok(vec![String::new(); df.height()]),
    }
}

/// Integrated table after totals, retention and ordering.
#[derive(Debug)]
pub struct FinalTable {
    pub frame: DataFrame,
    pub dropped_by_retention: usize,
}

pub struct Aggregator {
    retention: RetentionPolicy,
}

impl Aggregator {
    pub fn new(retention: RetentionPolicy) -> Self {
        Aggregator { retention }
    }

    /// Add the grand total, apply retention, fix the column order and sort.
    pub fn finalize(&self, resolved: DataFrame, clock: &RunClock) -> Result<FinalTable> {
        let mut df = resolved;

        let mut grand_total = vec![0i64; df.height()];
        for retailer in Retailer::ALL {
            let total = retailer.total_header();
            for (sum, value) in grand_total.iter_mut().zip(int_values_or_zero(&df, total)?) {
                *sum = sum.saturating_add(value);
            }
        }
        df.with_column(int_column(header::GRAND_TOTAL, grand_total))?;

        let before = df.height();
        let (df, dropped) = self.retention.apply(&df, header::UPLOAD_DATE, header::DATE, clock)?;
        if dropped > 0 {
            info!("Retention dropped {} of {} integrated rows", dropped, before);
        }

        let df = df.select(CANONICAL_COLUMNS)?;
        let frame = Self::sort_rows(&df)?;
        Ok(FinalTable { frame, dropped_by_retention: dropped })
    }

    /// Deterministic order over every column but the run timestamp.
    fn sort_rows(df: &DataFrame) -> Result<DataFrame> {
        if df.height() < 2 {
            return Ok(df.clone());
        }
        let by: Vec<&str> = CANONICAL_COLUMNS
            .iter()
            .copied()
            .filter(|name| *name != header::GENERATED_AT)
            .collect();
        Ok(df.sort(by, SortMultipleOptions::default().with_maintain_order(true))?)
    }

    /// Sum of one quantity header across the table.
    pub fn column_total(df: &DataFrame, name: &str) -> Result<i64> {
        Ok(int_values_or_zero(df, name)?
            .into_iter()
            .fold(0i64, i64::saturating_add))
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}
