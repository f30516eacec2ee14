use crate::models::Retailer;
use crate::models::schema::{self, header};
use crate::processor::frame::{
    filter_rows, has_column, int_column, text_column, text_values,
};
use crate::processor::normalizer::{clean_text, normalize_date, normalize_isbn, parse_count};
use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, info, warn};

/// How a mapped field's cells are canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Isbn,
    Text,
    Count,
}

/// One semantic field and the historical column names it has been exported
/// under, most recent first.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub column: &'static str,
    pub kind: FieldKind,
    pub candidates: &'static [&'static str],
}

impl FieldSpec {
    const fn new(column: &'static str, kind: FieldKind, candidates: &'static [&'static str]) -> Self {
        Self { column, kind, candidates }
    }
}

/// Quantity sub-column summed into the retailer total.
#[derive(Debug, Clone)]
pub struct QuantitySpec {
    pub column: &'static str,
    pub candidates: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct RetailerProfile {
    pub retailer: Retailer,
    pub fields: Vec<FieldSpec>,
    pub quantities: Vec<QuantitySpec>,
}

const DATE_NAMES: &[&str] = &[header::DATE, header::QUERY_PERIOD];
const UPLOAD_NAMES: &[&str] = &[header::UPLOAD_DATE];

impl RetailerProfile {
    pub fn for_retailer(retailer: Retailer) -> Self {
        use FieldKind::*;

        match retailer {
            Retailer::Kyobo => Self {
                retailer,
                fields: vec![
                    FieldSpec::new(schema::DATE, Date, DATE_NAMES),
                    FieldSpec::new(schema::ISBN, Isbn, &["ISBN"]),
                    FieldSpec::new(schema::TITLE, Text, &["도서명", "상품명"]),
                    FieldSpec::new(schema::AUTHOR, Text, &["저자"]),
                    FieldSpec::new(schema::PUBLISHER, Text, &["출판사"]),
                    FieldSpec::new(schema::PUB_DATE, Text, &["발행일", "출판일자"]),
                    FieldSpec::new(schema::PRICE, Count, &["정가"]),
                    FieldSpec::new(schema::UPLOAD_DATE, Text, UPLOAD_NAMES),
                ],
                quantities: vec![
                    QuantitySpec { column: "kyobo_offline", candidates: &["판매\n(영업점)", "판매(영업점)"] },
                    QuantitySpec { column: "kyobo_online", candidates: &["판매\n(온라인)", "판매(온라인)"] },
                    QuantitySpec { column: "kyobo_corporate", candidates: &["판매\n(법인)", "판매(법인)"] },
                ],
            },
            Retailer::Aladin => Self {
                retailer,
                fields: vec![
                    FieldSpec::new(schema::DATE, Date, DATE_NAMES),
                    FieldSpec::new(schema::ISBN, Isbn, &["ISBN"]),
                    FieldSpec::new(schema::TITLE, Text, &["도서명"]),
                    FieldSpec::new(schema::AUTHOR, Text, &["저자"]),
                    FieldSpec::new(schema::PUBLISHER, Text, &["출판사"]),
                    FieldSpec::new(schema::PRICE, Count, &["정가"]),
                    FieldSpec::new(schema::UPLOAD_DATE, Text, UPLOAD_NAMES),
                ],
                quantities: vec![QuantitySpec { column: "aladin_sales", candidates: &["판매권수", "판매건수"] }],
            },
            Retailer::Youngpoong => Self {
                retailer,
                fields: vec![
                    FieldSpec::new(schema::DATE, Date, DATE_NAMES),
                    FieldSpec::new(schema::ISBN, Isbn, &["ISBN", "바코드"]),
                    FieldSpec::new(schema::TITLE, Text, &["도서명"]),
                    FieldSpec::new(schema::AUTHOR, Text, &["저자"]),
                    FieldSpec::new(schema::PUBLISHER, Text, &["출판사", "출판사명"]),
                    FieldSpec::new(schema::PUB_DATE, Text, &["발행일"]),
                    FieldSpec::new(schema::GENRE, Text, &["자재그룹내역", "장르"]),
                    FieldSpec::new(schema::PRICE, Count, &["정가"]),
                    FieldSpec::new(schema::UPLOAD_DATE, Text, UPLOAD_NAMES),
                ],
                quantities: vec![QuantitySpec { column: "youngpoong_sales", candidates: &["판매수량"] }],
            },
            Retailer::Yes24 => Self {
                retailer,
                fields: vec![
                    FieldSpec::new(schema::DATE, Date, DATE_NAMES),
                    FieldSpec::new(schema::ISBN, Isbn, &["ISBN", "ISBN13"]),
                    FieldSpec::new(schema::TITLE, Text, &["도서명", "상품명"]),
                    FieldSpec::new(schema::PUBLISHER, Text, &["출판사", "제조사"]),
                    FieldSpec::new(schema::UPLOAD_DATE, Text, UPLOAD_NAMES),
                    FieldSpec::new(schema::UPDATED_AT, Text, &[header::SOURCE_UPDATED_AT]),
                ],
                quantities: vec![QuantitySpec { column: "yes24_sales", candidates: &["당월판매량"] }],
            },
        }
    }

    pub fn total_column(&self) -> &'static str {
        self.retailer.total_column()
    }

    /// Every column a canonical frame of this retailer carries, in order.
    pub fn output_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self.fields.iter().map(|f| f.column).collect();
        columns.extend(self.quantities.iter().map(|q| q.column));
        columns.push(self.total_column());
        columns
    }
}

/// Harmonizes each retailer's raw ledger into its canonical frame.
pub struct ColumnMapper {
    profiles: Vec<RetailerProfile>,
}

impl ColumnMapper {
    pub fn new() -> Self {
        ColumnMapper {
            profiles: Retailer::ALL.into_iter().map(RetailerProfile::for_retailer).collect(),
        }
    }

    pub fn profile(&self, retailer: Retailer) -> &RetailerProfile {
        // Every retailer gets a profile in `new`.
        &self.profiles[retailer.priority()]
    }

    /// First candidate column present in the raw frame, logging which one fired.
    pub fn select_candidate<'a>(
        &self,
        raw: &DataFrame,
        retailer: Retailer,
        field: &str,
        candidates: &'a [&'a str],
    ) -> Option<&'a str> {
        let selected = candidates.iter().copied().find(|name| has_column(raw, name));
        match selected {
            Some(name) if Some(&name) != candidates.first() => {
                info!(
                    "{}: field '{}' read from older column name {:?}",
                    retailer, field, name
                );
            }
            Some(name) => debug!("{}: field '{}' read from {:?}", retailer, field, name),
            None => debug!(
                "{}: field '{}' unavailable (tried {:?}), defaulting to empty",
                retailer, field, candidates
            ),
        }
        selected
    }

    /// Map one raw ledger into the retailer's canonical frame.
    ///
    /// An empty ledger maps to an empty frame. Rows whose date and ISBN both
    /// fail to normalize carry no usable key and are dropped.
    pub fn map_frame(&self, retailer: Retailer, raw: &DataFrame) -> Result<DataFrame> {
        if raw.height() == 0 {
            info!("{}: ledger is empty, nothing to map", retailer);
            return Ok(DataFrame::empty());
        }

        let profile = self.profile(retailer);
        let height = raw.height();
        let mut columns: Vec<Column> = Vec::with_capacity(profile.output_columns().len());
        let mut dates: Vec<String> = vec![String::new(); height];
        let mut isbns: Vec<String> = vec![String::new(); height];

        for spec in &profile.fields {
            let cells = match self.select_candidate(raw, retailer, spec.column, spec.candidates) {
                Some(name) => text_values(raw, name)?,
                None => vec![String::new(); height],
            };

            let column = match spec.kind {
                FieldKind::Date => {
                    dates = cells.iter().map(|c| normalize_date(c)).collect();
                    text_column(spec.column, dates.clone())
                }
                FieldKind::Isbn => {
                    isbns = cells.iter().map(|c| normalize_isbn(c)).collect();
                    text_column(spec.column, isbns.clone())
                }
                FieldKind::Text => {
                    text_column(spec.column, cells.iter().map(|c| clean_text(c)).collect())
                }
                FieldKind::Count => {
                    int_column(spec.column, cells.iter().map(|c| parse_count(c)).collect())
                }
            };
            columns.push(column);
        }

        let mut total = vec![0i64; height];
        for spec in &profile.quantities {
            let counts: Vec<i64> = match self.select_candidate(raw, retailer, spec.column, spec.candidates) {
                Some(name) => text_values(raw, name)?.iter().map(|c| parse_count(c)).collect(),
                None => vec![0; height],
            };
            for (sum, count) in total.iter_mut().zip(&counts) {
                *sum = sum.saturating_add(*count);
            }
            columns.push(int_column(spec.column, counts));
        }
        columns.push(int_column(profile.total_column(), total));

        let mapped = DataFrame::new(columns)?;

        let keep: Vec<bool> = dates
            .iter()
            .zip(&isbns)
            .map(|(date, isbn)| !(date.is_empty() && isbn.is_empty()))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            warn!("{}: dropped {} rows without a usable date or ISBN", retailer, dropped);
        }
        let unkeyed = dates
            .iter()
            .zip(&isbns)
            .filter(|(date, isbn)| date.is_empty() != isbn.is_empty())
            .count();
        if unkeyed > 0 {
            warn!("{}: {} rows have only one of date/ISBN after normalization", retailer, unkeyed);
        }

        let mapped = filter_rows(&mapped, &keep)?;
        info!("{}: mapped {} of {} ledger rows", retailer, mapped.height(), height);
        Ok(mapped)
    }
}

impl Default for ColumnMapper {
    fn default() -> Self {
        Self::new()
    }
}
