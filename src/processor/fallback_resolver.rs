use crate::models::schema::{self, QUANTITY_COLUMNS, header};
use crate::models::{Retailer, RunClock};
use crate::processor::frame::{int_column, optional_ints, optional_text, text_column};
use crate::processor::merge_engine::MergedFrame;
use crate::processor::normalizer::weekday_label;
use anyhow::Result;
use polars::prelude::*;
use tracing::info;

/// Where a descriptive field of the integrated table comes from.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub column: &'static str,
    pub header: &'static str,
    pub priority: &'static [Retailer],
}

const ALL_FOUR: &[Retailer] = &[Retailer::Kyobo, Retailer::Aladin, Retailer::Youngpoong, Retailer::Yes24];

/// Observed text-field priorities; genre only ever comes from Youngpoong.
pub const TEXT_RULES: [FieldRule; 5] = [
    FieldRule { column: schema::TITLE, header: header::TITLE, priority: ALL_FOUR },
    FieldRule {
        column: schema::AUTHOR,
        header: header::AUTHOR,
        priority: &[Retailer::Kyobo, Retailer::Aladin, Retailer::Youngpoong],
    },
    FieldRule {
        column: schema::PUB_DATE,
        header: header::PUB_DATE,
        priority: &[Retailer::Kyobo, Retailer::Youngpoong],
    },
    FieldRule { column: schema::PUBLISHER, header: header::PUBLISHER, priority: ALL_FOUR },
    FieldRule { column: schema::GENRE, header: header::GENRE, priority: &[Retailer::Youngpoong] },
];

pub const PRICE_RULE: FieldRule = FieldRule {
    column: schema::PRICE,
    header: header::PRICE,
    priority: &[Retailer::Kyobo, Retailer::Aladin, Retailer::Youngpoong],
};

/// How often each source filled a field, for diagnosing degraded runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackUsage {
    pub header: &'static str,
    pub filled_by: Vec<(Retailer, usize)>,
    pub unresolved: usize,
}

impl FallbackUsage {
    fn new(rule: &FieldRule) -> Self {
        Self {
            header: rule.header,
            filled_by: rule.priority.iter().map(|r| (*r, 0)).collect(),
            unresolved: 0,
        }
    }

    fn record(&mut self, source: Option<usize>) {
        match source {
            Some(index) => self.filled_by[index].1 += 1,
            None => self.unresolved += 1,
        }
    }

    /// Rows filled by something other than the first-priority source.
    pub fn fallbacks(&self) -> usize {
        self.filled_by.iter().skip(1).map(|(_, n)| n).sum()
    }

    pub fn count_for(&self, retailer: Retailer) -> usize {
        self.filled_by
            .iter()
            .find(|(r, _)| *r == retailer)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    fn log(&self) {
        let sources: Vec<String> = self
            .filled_by
            .iter()
            .map(|(retailer, n)| format!("{}={}", retailer, n))
            .collect();
        info!(
            "Field {}: {} (fallbacks {}, unresolved {})",
            self.header,
            sources.join(", "),
            self.fallbacks(),
            self.unresolved
        );
    }
}

/// Resolved table before totals and retention, plus per-field diagnostics.
#[derive(Debug)]
pub struct ResolvedTable {
    pub frame: DataFrame,
    pub usage: Vec<FallbackUsage>,
}

pub struct FallbackResolver;

impl FallbackResolver {
    pub fn new() -> Self {
        FallbackResolver
    }

    /// Fill each integrated-table column from the merged frame.
    ///
    /// A value that is missing or empty (zero for price) counts as absent and
    /// the next source in the field's priority list is consulted.
    pub fn resolve(&self, merged: &MergedFrame, clock: &RunClock) -> Result<ResolvedTable> {
        let height = merged.height();
        let mut columns: Vec<Column> = Vec::new();
        let mut usage = Vec::new();

        let dates = key_values(merged, schema::DATE)?;
        let isbns = key_values(merged, schema::ISBN)?;
        let weekdays: Vec<String> = dates.iter().map(|d| weekday_label(d)).collect();

        columns.push(text_column(header::DATE, dates));
        columns.push(text_column(header::WEEKDAY, weekdays));
        columns.push(text_column(header::ISBN, isbns));

        for rule in &TEXT_RULES {
            let (values, field_usage) = self.resolve_text(merged, rule)?;
            field_usage.log();
            columns.push(text_column(rule.header, values));
            usage.push(field_usage);
        }

        let (prices, price_usage) = self.resolve_price(merged, &PRICE_RULE)?;
        price_usage.log();
        columns.push(int_column(PRICE_RULE.header, prices));
        usage.push(price_usage);

        for quantity in &QUANTITY_COLUMNS {
            let values = match merged.column_for(quantity.retailer, quantity.column) {
                Some(name) => optional_ints(&merged.frame, name)?
                    .map(|v| v.into_iter().map(|q| q.unwrap_or(0)).collect())
                    .unwrap_or_else(|| vec![0; height]),
                None => vec![0; height],
            };
            columns.push(int_column(quantity.header, values));
        }

        let upload_sources: Vec<&str> = Retailer::ALL
            .iter()
            .filter_map(|r| merged.column_for(*r, schema::UPLOAD_DATE))
            .collect();
        columns.push(text_column(
            header::UPLOAD_DATE,
            latest_values(merged, &upload_sources)?,
        ));

        let freshness_sources: Vec<&str> = merged
            .column_for(Retailer::Yes24, schema::UPDATED_AT)
            .into_iter()
            .collect();
        columns.push(text_column(
            header::YES24_UPDATED_AT,
            latest_values(merged, &freshness_sources)?,
        ));

        columns.push(text_column(header::GENERATED_AT, vec![clock.timestamp(); height]));

        let frame = DataFrame::new(columns)?;
        info!("Resolved {} integrated rows", frame.height());
        Ok(ResolvedTable { frame, usage })
    }

    fn resolve_text(&self, merged: &MergedFrame, rule: &FieldRule) -> Result<(Vec<String>, FallbackUsage)> {
        let candidates = rule
            .priority
            .iter()
            .map(|retailer| match merged.column_for(*retailer, rule.column) {
                Some(name) => optional_text(&merged.frame, name),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut usage = FallbackUsage::new(rule);
        let mut values = Vec::with_capacity(merged.height());
        for row in 0..merged.height() {
            let found = candidates.iter().enumerate().find_map(|(index, source)| {
                let value = source.as_ref()?.get(row)?.as_deref()?.trim();
                (!value.is_empty()).then(|| (index, value.to_string()))
            });
            usage.record(found.as_ref().map(|(index, _)| *index));
            values.push(found.map(|(_, value)| value).unwrap_or_default());
        }
        Ok((values, usage))
    }

    fn resolve_price(&self, merged: &MergedFrame, rule: &FieldRule) -> Result<(Vec<i64>, FallbackUsage)> {
        let candidates = rule
            .priority
            .iter()
            .map(|retailer| match merged.column_for(*retailer, rule.column) {
                Some(name) => optional_ints(&merged.frame, name),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut usage = FallbackUsage::new(rule);
        let mut values = Vec::with_capacity(merged.height());
        for row in 0..merged.height() {
            let found = candidates.iter().enumerate().find_map(|(index, source)| {
                let value = (*source.as_ref()?.get(row)?)?;
                (value != 0).then_some((index, value))
            });
            usage.record(found.map(|(index, _)| index));
            values.push(found.map(|(_, value)| value).unwrap_or(0));
        }
        Ok((values, usage))
    }
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn key_values(merged: &MergedFrame, key: &str) -> Result<Vec<String>> {
    Ok(match optional_text(&merged.frame, key)? {
        Some(values) => values.into_iter().map(Option::unwrap_or_default).collect(),
        None => vec![String::new(); merged.height()],
    })
}

/// Lexicographic maximum of the non-empty values across the given columns.
///
/// Valid for `YYYY-MM-DD[ HH:MM:SS]` stamps, which sort as strings.
fn latest_values(merged: &MergedFrame, columns: &[&str]) -> Result<Vec<String>> {
    let sources = columns
        .iter()
        .map(|name| optional_text(&merged.frame, name))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..merged.height())
        .map(|row| {
            sources
                .iter()
                .filter_map(|source| source.as_ref()?.get(row)?.as_deref())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .max()
                .unwrap_or_default()
                .to_string()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::column_mapper::ColumnMapper;
    use crate::processor::frame::{int_values_or_zero, text_values};
    use crate::processor::merge_engine::MergeEngine;
    use chrono::NaiveDate;

    fn clock() -> RunClock {
        RunClock::at(
            NaiveDate::from_ymd_opt(2026, 1, 11)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn merge(raw: Vec<(Retailer, DataFrame)>) -> MergedFrame {
        let mapper = ColumnMapper::new();
        let mapped = raw
            .into_iter()
            .map(|(retailer, df)| (retailer, mapper.map_frame(retailer, &df).unwrap()))
            .collect();
        MergeEngine::new().merge(mapped).unwrap()
    }

    #[test]
    fn test_empty_title_falls_back_to_lower_priority_source() {
        let merged = merge(vec![
            (
                Retailer::Kyobo,
                df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "도서명" => [""], "정가" => ["0"])
                    .unwrap(),
            ),
            (
                Retailer::Aladin,
                df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "도서명" => ["알라딘 제목"], "정가" => ["16,800"])
                    .unwrap(),
            ),
        ]);

        let resolved = FallbackResolver::new().resolve(&merged, &clock()).unwrap();
        assert_eq!(text_values(&resolved.frame, header::TITLE).unwrap(), vec!["알라딘 제목"]);
        assert_eq!(int_values_or_zero(&resolved.frame, header::PRICE).unwrap(), vec![16800]);

        let title_usage = resolved.usage.iter().find(|u| u.header == header::TITLE).unwrap();
        assert_eq!(title_usage.count_for(Retailer::Aladin), 1);
        assert_eq!(title_usage.fallbacks(), 1);
    }

    #[test]
    fn test_genre_only_from_youngpoong() {
        let merged = merge(vec![
            (
                Retailer::Kyobo,
                df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "도서명" => ["제목"]).unwrap(),
            ),
            (
                Retailer::Youngpoong,
                df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "자재그룹내역" => ["소설"]).unwrap(),
            ),
        ]);

        let resolved = FallbackResolver::new().resolve(&merged, &clock()).unwrap();
        assert_eq!(text_values(&resolved.frame, header::GENRE).unwrap(), vec!["소설"]);
        assert_eq!(text_values(&resolved.frame, header::TITLE).unwrap(), vec!["제목"]);
    }

    #[test]
    fn test_upload_date_takes_latest_and_weekday_is_derived() {
        let merged = merge(vec![
            (
                Retailer::Aladin,
                df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "업로드날짜" => ["2026-01-11"]).unwrap(),
            ),
            (
                Retailer::Yes24,
                df!(
                    "날짜" => ["2026-01-10"],
                    "ISBN" => ["9791234567890"],
                    "업로드날짜" => ["2026-01-12"],
                    "UpdatedAt" => ["2026-01-12 06:10:00"]
                )
                .unwrap(),
            ),
        ]);

        let resolved = FallbackResolver::new().resolve(&merged, &clock()).unwrap();
        let frame = &resolved.frame;
        assert_eq!(text_values(frame, header::UPLOAD_DATE).unwrap(), vec!["2026-01-12"]);
        assert_eq!(text_values(frame, header::YES24_UPDATED_AT).unwrap(), vec!["2026-01-12 06:10:00"]);
        assert_eq!(text_values(frame, header::WEEKDAY).unwrap(), vec!["토"]);
        assert_eq!(text_values(frame, header::GENERATED_AT).unwrap(), vec!["2026-01-11 09:00:00"]);
    }

    #[test]
    fn test_exhausted_priority_leaves_empty_and_zero() {
        let merged = merge(vec![(
            Retailer::Yes24,
            df!("날짜" => ["2026-01-10"], "ISBN" => ["9791234567890"], "당월판매량" => ["3"]).unwrap(),
        )]);

        let resolved = FallbackResolver::new().resolve(&merged, &clock()).unwrap();
        assert_eq!(text_values(&resolved.frame, header::AUTHOR).unwrap(), vec![""]);
        assert_eq!(int_values_or_zero(&resolved.frame, header::PRICE).unwrap(), vec![0]);
        assert_eq!(int_values_or_zero(&resolved.frame, "YES24").unwrap(), vec![3]);
        assert_eq!(int_values_or_zero(&resolved.frame, "교보계").unwrap(), vec![0]);

        let author = resolved.usage.iter().find(|u| u.header == header::AUTHOR).unwrap();
        assert_eq!(author.unresolved, 1);
    }
}
