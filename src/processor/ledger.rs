//! Per-retailer ledgers: the accumulated raw exports the reconciliation reads.
//!
//! A batch is one portal export for one query date. It is cleaned into a text
//! frame, stamped, checked for obvious collection mistakes and appended.

use crate::models::schema::header;
use crate::models::{Retailer, RunClock};
use crate::processor::aggregator::RetentionPolicy;
use crate::processor::column_mapper::RetailerProfile;
use crate::processor::frame::{
    column_names, frame_from_rows, has_column, text_column, text_values, union_text_frames,
};
use crate::processor::normalizer::{normalize_date, parse_count};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cells that mark the header row of a portal export.
const HEADER_MARKERS: [&str; 4] = ["ISBN", "상품명", "도서명", "제목"];

/// Labels of total rows appended by some portals.
const SUMMARY_LABELS: [&str; 3] = ["합계", "합 계", "총계"];

/// Columns that carry the ISBN in a raw export.
const ISBN_HEADERS: [&str; 3] = ["ISBN", "ISBN13", "바코드"];

const OVERLAP_THRESHOLD: f64 = 0.95;
const RECENT_ROWS: usize = 3;

/// Read a CSV export into a grid of cells. Rows keep their own width, so
/// preamble lines above the header do not break parsing.
pub fn read_grid<R: Read>(reader: R) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut grid = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

pub fn read_grid_file(path: &Path) -> Result<Vec<Vec<String>>> {
    let file = File::open(path).with_context(|| format!("Failed to open export: {}", path.display()))?;
    read_grid(file).with_context(|| format!("Failed to read export: {}", path.display()))
}

/// Index of the first row that looks like the export's header.
pub fn locate_header(grid: &[Vec<String>]) -> Option<usize> {
    grid.iter().position(|row| {
        row.iter()
            .map(|cell| cell.trim())
            .any(|cell| HEADER_MARKERS.contains(&cell) || cell.starts_with("ISBN"))
    })
}

fn is_summary_row(row: &[String]) -> bool {
    row.iter().any(|cell| SUMMARY_LABELS.contains(&cell.trim()))
}

/// Clean a raw export grid into a text frame.
///
/// Only columns with a header survive (a repeated header keeps its first
/// column). Summary rows, blank rows and, when the export has an ISBN
/// column, rows without an ISBN are dropped. A grid without a header row
/// yields an empty frame.
pub fn grid_to_frame(grid: &[Vec<String>]) -> Result<DataFrame> {
    let Some(header_index) = locate_header(grid) else {
        warn!("No header row found in {} grid rows", grid.len());
        return Ok(DataFrame::empty());
    };
    if header_index > 0 {
        debug!("Skipping {} preamble rows before header", header_index);
    }

    let mut seen = HashSet::new();
    let kept: Vec<(usize, String)> = grid[header_index]
        .iter()
        .enumerate()
        .map(|(index, name)| (index, name.trim().to_string()))
        .filter(|(_, name)| !name.is_empty() && seen.insert(name.clone()))
        .collect();

    let isbn_position = kept
        .iter()
        .position(|(_, name)| ISBN_HEADERS.contains(&name.as_str()));

    let mut summary = 0usize;
    let mut blank = 0usize;
    let mut no_isbn = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for raw in &grid[header_index + 1..] {
        let row: Vec<String> = kept
            .iter()
            .map(|(index, _)| raw.get(*index).map(|c| c.trim().to_string()).unwrap_or_default())
            .collect();

        if row.iter().all(|cell| cell.is_empty()) {
            blank += 1;
        } else if is_summary_row(&row) {
            summary += 1;
        } else if isbn_position.is_some_and(|p| row[p].is_empty()) {
            no_isbn += 1;
        } else {
            rows.push(row);
        }
    }

    info!(
        "Grid cleaned: {} rows kept ({} summary, {} blank, {} without ISBN dropped)",
        rows.len(),
        summary,
        blank,
        no_isbn
    );

    let headers: Vec<String> = kept.into_iter().map(|(_, name)| name).collect();
    frame_from_rows(&headers, &rows)
}

/// Non-fatal problems spotted in a batch before it is appended.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWarning {
    DuplicateDate(String),
    HighOverlap(f64),
    EmptyBatch,
    AllZeroSales,
}

impl fmt::Display for BatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchWarning::DuplicateDate(date) => write!(f, "ledger already holds rows for {}", date),
            BatchWarning::HighOverlap(ratio) => {
                write!(f, "{:.1}% of ISBNs match the most recent ledger rows", ratio * 100.0)
            }
            BatchWarning::EmptyBatch => write!(f, "batch has no rows"),
            BatchWarning::AllZeroSales => write!(f, "every sales quantity in the batch is zero"),
        }
    }
}

/// Column renames applied to a retailer's raw export before it is stored.
fn ledger_renames(retailer: Retailer) -> &'static [(&'static str, &'static str)] {
    match retailer {
        Retailer::Kyobo => &[("상품명", "도서명"), ("출판일자", "발행일"), ("조회기간", "날짜")],
        Retailer::Aladin => &[("조회기간", "날짜")],
        Retailer::Youngpoong => &[("바코드", "ISBN"), ("출판사명", "출판사"), ("조회기간", "날짜")],
        Retailer::Yes24 => &[
            ("ISBN13", "ISBN"),
            ("상품명", "도서명"),
            ("제조사", "출판사"),
            ("조회기간", "날짜"),
        ],
    }
}

/// Aladin exports price and quantity with unit suffixes (`원`, `권`).
const ALADIN_UNIT_COLUMNS: [&str; 2] = ["정가", "판매권수"];

pub struct LedgerWriter {
    retention: RetentionPolicy,
}

impl LedgerWriter {
    pub fn new(retention: RetentionPolicy) -> Self {
        LedgerWriter { retention }
    }

    /// Rename, strip units and stamp a cleaned batch for `query_date`.
    pub fn prepare_batch(
        &self,
        retailer: Retailer,
        batch: DataFrame,
        query_date: NaiveDate,
        clock: &RunClock,
    ) -> Result<DataFrame> {
        let mut df = batch;
        let height = df.height();

        for (from, to) in ledger_renames(retailer) {
            if has_column(&df, from) && !has_column(&df, to) {
                df.rename(from, (*to).into())?;
                debug!("{}: renamed column {} -> {}", retailer, from, to);
            }
        }

        if retailer == Retailer::Aladin {
            for name in ALADIN_UNIT_COLUMNS {
                if has_column(&df, name) {
                    let stripped = text_values(&df, name)?
                        .iter()
                        .map(|cell| parse_count(cell).to_string())
                        .collect();
                    df.with_column(text_column(name, stripped))?;
                }
            }
        }

        df.with_column(text_column(header::UPLOAD_DATE, vec![clock.date_stamp(); height]))?;

        let query = query_date.format("%Y-%m-%d").to_string();
        let dates = if has_column(&df, header::DATE) {
            text_values(&df, header::DATE)?
                .into_iter()
                .map(|cell| if cell.trim().is_empty() { query.clone() } else { cell })
                .collect()
        } else {
            vec![query; height]
        };
        df.with_column(text_column(header::DATE, dates))?;

        if retailer == Retailer::Yes24 {
            df.with_column(text_column(header::SOURCE_UPDATED_AT, vec![clock.timestamp(); height]))?;
        }

        Ok(df)
    }

    /// Warnings for a prepared batch against the current ledger.
    pub fn validate_batch(
        &self,
        retailer: Retailer,
        ledger: Option<&DataFrame>,
        batch: &DataFrame,
        query_date: NaiveDate,
    ) -> Result<Vec<BatchWarning>> {
        let mut warnings = Vec::new();

        if let Some(ledger) = ledger.filter(|df| has_column(df, header::DATE)) {
            let target = query_date.format("%Y-%m-%d").to_string();
            let duplicate = text_values(ledger, header::DATE)?
                .iter()
                .any(|cell| normalize_date(cell) == target);
            if duplicate {
                warnings.push(BatchWarning::DuplicateDate(target));
            }
        }

        if let Some(ledger) = ledger.filter(|df| df.height() > RECENT_ROWS && has_column(df, header::ISBN)) {
            if has_column(batch, header::ISBN) {
                let ledger_isbns = text_values(ledger, header::ISBN)?;
                let recent: HashSet<&str> = ledger_isbns
                    [ledger_isbns.len() - RECENT_ROWS..]
                    .iter()
                    .map(String::as_str)
                    .collect();
                let current: HashSet<String> = text_values(batch, header::ISBN)?
                    .into_iter()
                    .filter(|isbn| !isbn.is_empty())
                    .collect();
                if !current.is_empty() {
                    let shared = current.iter().filter(|isbn| recent.contains(isbn.as_str())).count();
                    let ratio = shared as f64 / current.len() as f64;
                    if ratio > OVERLAP_THRESHOLD {
                        warnings.push(BatchWarning::HighOverlap(ratio));
                    }
                }
            }
        }

        if batch.height() == 0 {
            warnings.push(BatchWarning::EmptyBatch);
        } else {
            let profile = RetailerProfile::for_retailer(retailer);
            let quantity_columns: Vec<&str> = profile
                .quantities
                .iter()
                .filter_map(|spec| spec.candidates.iter().copied().find(|name| has_column(batch, name)))
                .collect();
            if !quantity_columns.is_empty() {
                let mut total = 0i64;
                for name in quantity_columns {
                    total = text_values(batch, name)?
                        .iter()
                        .map(|c| parse_count(c))
                        .fold(total, i64::saturating_add);
                }
                if total == 0 {
                    warnings.push(BatchWarning::AllZeroSales);
                }
            }
        }

        for warning in &warnings {
            warn!("{}: {}", retailer, warning);
        }
        Ok(warnings)
    }

    /// Append a prepared batch, apply retention on upload date and order by
    /// sale date.
    pub fn append(&self, ledger: Option<DataFrame>, batch: &DataFrame, clock: &RunClock) -> Result<DataFrame> {
        let combined = match ledger {
            Some(existing) if existing.height() > 0 => union_text_frames(&existing, batch)?,
            _ => union_text_frames(&DataFrame::empty(), batch)?,
        };

        let (retained, dropped) = self
            .retention
            .apply(&combined, header::UPLOAD_DATE, header::DATE, clock)?;
        if dropped > 0 {
            info!("Ledger retention dropped {} rows", dropped);
        }

        if retained.height() < 2 || !has_column(&retained, header::DATE) {
            return Ok(retained);
        }
        Ok(retained.sort([header::DATE], SortMultipleOptions::default().with_maintain_order(true))?)
    }
}

impl Default for LedgerWriter {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

/// Dates from `start` through yesterday with no row in the ledger.
pub fn missing_dates(ledger: Option<&DataFrame>, start: NaiveDate, clock: &RunClock) -> Result<Vec<NaiveDate>> {
    let present: HashSet<String> = match ledger {
        Some(df) if has_column(df, header::DATE) => text_values(df, header::DATE)?
            .iter()
            .map(|cell| normalize_date(cell))
            .filter(|date| !date.is_empty())
            .collect(),
        _ => HashSet::new(),
    };

    let end = clock.yesterday();
    let mut missing = Vec::new();
    let mut date = start;
    while date <= end {
        if !present.contains(&date.format("%Y-%m-%d").to_string()) {
            missing.push(date);
        }
        date += Duration::days(1);
    }
    Ok(missing)
}

/// Columns of a ledger, for diagnostics.
pub fn describe(df: &DataFrame) -> String {
    format!("{} rows x [{}]", df.height(), column_names(df).join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn clock() -> RunClock {
        RunClock::at(
            NaiveDate::from_ymd_opt(2026, 1, 11)
                .unwrap()
                .and_hms_opt(7, 15, 0)
                .unwrap(),
        )
    }

    fn date(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_header_located_after_preamble() {
        let raw = grid(&[
            &["판매 현황", "", ""],
            &["조회기간: 2026-01-10", "", ""],
            &["ISBN", "상품명", "판매권수"],
            &["9791234567890", "책", "2"],
        ]);
        assert_eq!(locate_header(&raw), Some(2));
        assert_eq!(locate_header(&grid(&[&["a", "b"]])), None);
    }

    #[test]
    fn test_export_file_with_preamble_line() {
        let path = std::env::temp_dir().join(format!("export-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "판매 현황\n조회기간,2026-01-10\nISBN,상품명,판매권수\n9791234567890,\"책, 개정판\",2\n합계,,2\n",
        )
        .unwrap();

        let raw = read_grid_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(raw.len(), 5);
        assert_eq!(raw[0], vec!["판매 현황"]);

        let df = grid_to_frame(&raw).unwrap();
        assert_eq!(column_names(&df), vec!["ISBN", "상품명", "판매권수"]);
        assert_eq!(df.height(), 1);
        assert_eq!(text_values(&df, "상품명").unwrap(), vec!["책, 개정판"]);
        assert_eq!(text_values(&df, "판매권수").unwrap(), vec!["2"]);
    }

    #[test]
    fn test_missing_export_file_is_an_error() {
        assert!(read_grid_file(Path::new("does/not/exist.csv")).is_err());
    }

    #[test]
    fn test_grid_cleaning_drops_summary_blank_and_isbnless_rows() {
        let raw = grid(&[
            &["ISBN", "도서명", "", "판매권수"],
            &["9791234567890", "총균쇠", "x", "2"],
            &["", "", "", ""],
            &["", "누락", "", "1"],
            &["합계", "", "", "3"],
        ]);

        let df = grid_to_frame(&raw).unwrap();
        assert_eq!(column_names(&df), vec!["ISBN", "도서명", "판매권수"]);
        assert_eq!(df.height(), 1);
        assert_eq!(text_values(&df, "도서명").unwrap(), vec!["총균쇠"]);
    }

    #[test]
    fn test_prepare_batch_renames_strips_and_stamps() {
        let batch = df!(
            "ISBN" => ["9791234567890"],
            "정가" => ["16,800원"],
            "판매권수" => ["3권"],
            "조회기간" => [""]
        )
        .unwrap();

        let writer = LedgerWriter::default();
        let df = writer
            .prepare_batch(Retailer::Aladin, batch, date("2026-01-10"), &clock())
            .unwrap();

        assert_eq!(text_values(&df, "정가").unwrap(), vec!["16800"]);
        assert_eq!(text_values(&df, "판매권수").unwrap(), vec!["3"]);
        assert_eq!(text_values(&df, "날짜").unwrap(), vec!["2026-01-10"]);
        assert_eq!(text_values(&df, "업로드날짜").unwrap(), vec!["2026-01-11"]);
        assert!(!has_column(&df, "조회기간"));
        assert!(!has_column(&df, "UpdatedAt"));
    }

    #[test]
    fn test_yes24_batch_gets_freshness_stamp() {
        let batch = df!("ISBN13" => ["9791234567890"], "당월판매량" => ["4"]).unwrap();
        let df = LedgerWriter::default()
            .prepare_batch(Retailer::Yes24, batch, date("2026-01-10"), &clock())
            .unwrap();
        assert_eq!(text_values(&df, "ISBN").unwrap(), vec!["9791234567890"]);
        assert_eq!(text_values(&df, "UpdatedAt").unwrap(), vec!["2026-01-11 07:15:00"]);
    }

    #[test]
    fn test_validation_warnings() {
        let ledger = df!(
            "날짜" => ["2026-01-07", "2026-01-08", "2026-01-09", "2026-01-10"],
            "ISBN" => ["9790000000001", "9790000000001", "9790000000002", "9790000000003"]
        )
        .unwrap();
        let batch = df!(
            "날짜" => ["2026-01-10", "2026-01-10"],
            "ISBN" => ["9790000000002", "9790000000003"],
            "판매권수" => ["0", "0"]
        )
        .unwrap();

        let warnings = LedgerWriter::default()
            .validate_batch(Retailer::Aladin, Some(&ledger), &batch, date("2026-01-10"))
            .unwrap();
        assert_eq!(
            warnings,
            vec![
                BatchWarning::DuplicateDate("2026-01-10".to_string()),
                BatchWarning::HighOverlap(1.0),
                BatchWarning::AllZeroSales,
            ]
        );

        let empty = LedgerWriter::default()
            .validate_batch(Retailer::Kyobo, None, &DataFrame::empty(), date("2026-01-10"))
            .unwrap();
        assert_eq!(empty, vec![BatchWarning::EmptyBatch]);
    }

    #[test]
    fn test_append_applies_retention_and_sorts() {
        let ledger = df!(
            "날짜" => ["2026-01-09", "2021-05-01"],
            "ISBN" => ["9790000000001", "9790000000002"],
            "업로드날짜" => ["2026-01-10", "2021-05-02"]
        )
        .unwrap();
        let batch = df!(
            "날짜" => ["2026-01-08"],
            "ISBN" => ["9790000000003"],
            "업로드날짜" => ["2026-01-11"],
            "판매수량" => ["2"]
        )
        .unwrap();

        let appended = LedgerWriter::default().append(Some(ledger), &batch, &clock()).unwrap();
        assert_eq!(text_values(&appended, "날짜").unwrap(), vec!["2026-01-08", "2026-01-09"]);
        assert_eq!(text_values(&appended, "판매수량").unwrap(), vec!["2", ""]);
    }

    #[test]
    fn test_missing_dates_until_yesterday() {
        let ledger = df!("날짜" => ["2026-01-07", "2026.01.09"]).unwrap();
        let missing = missing_dates(Some(&ledger), date("2026-01-06"), &clock()).unwrap();
        assert_eq!(
            missing,
            vec![date("2026-01-06"), date("2026-01-08"), date("2026-01-10")]
        );
        assert!(missing_dates(None, date("2026-01-12"), &clock()).unwrap().is_empty());
    }
}
