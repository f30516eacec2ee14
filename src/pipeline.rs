//! One reconciliation run: ledgers in, integrated table out.
//!
//! The compute stages are synchronous and take already-loaded frames; only
//! loading, persisting and syncing touch I/O.

use crate::config::PipelineConfig;
use crate::models::schema::header;
use crate::models::{Retailer, RunClock, RunSummary};
use crate::processor::fallback_resolver::FallbackUsage;
use crate::processor::{
    Aggregator, BatchWarning, ColumnMapper, FallbackResolver, LedgerWriter, MergeEngine,
    RetentionPolicy, SinkAdapter,
};
use crate::sink::{SalesSink, SyncReport, push_inventory, push_sales};
use crate::storage::{StorageManager, TableStore};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::future::join_all;
use polars::prelude::*;
use tracing::{error, info, warn};

/// Result of reconciling the ledgers.
#[derive(Debug)]
pub struct Reconciliation {
    pub table: DataFrame,
    pub summary: RunSummary,
    pub usage: Vec<FallbackUsage>,
}

pub struct Reconciler {
    mapper: ColumnMapper,
    merger: MergeEngine,
    resolver: FallbackResolver,
    aggregator: Aggregator,
}

impl Reconciler {
    pub fn new(retention: RetentionPolicy) -> Self {
        Reconciler {
            mapper: ColumnMapper::new(),
            merger: MergeEngine::new(),
            resolver: FallbackResolver::new(),
            aggregator: Aggregator::new(retention),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(RetentionPolicy::new(config.retention.days))
    }

    /// Map, merge, resolve and aggregate the given raw ledgers.
    ///
    /// A ledger that fails to map is logged and treated as empty.
    pub fn reconcile(&self, ledgers: Vec<(Retailer, DataFrame)>, clock: &RunClock) -> Result<Reconciliation> {
        let mut mapped = Vec::with_capacity(ledgers.len());
        for (retailer, raw) in ledgers {
            match self.mapper.map_frame(retailer, &raw) {
                Ok(frame) => mapped.push((retailer, frame)),
                Err(e) => {
                    error!("{}: failed to map ledger, treating as empty: {:#}", retailer, e);
                    mapped.push((retailer, DataFrame::empty()));
                }
            }
        }

        let merged = self.merger.merge(mapped)?;
        if merged.sources().len() < Retailer::ALL.len() {
            warn!("Reconciling with {} of {} retailers: {:?}", merged.sources().len(), Retailer::ALL.len(), merged.sources());
        }
        let resolved = self.resolver.resolve(&merged, clock)?;
        let table = self.aggregator.finalize(resolved.frame, clock)?;

        let summary = summarize(&table.frame, table.dropped_by_retention, clock)?;
        Ok(Reconciliation {
            table: table.frame,
            summary,
            usage: resolved.usage,
        })
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

pub fn summarize(table: &DataFrame, dropped_by_retention: usize, clock: &RunClock) -> Result<RunSummary> {
    let sum = |name: &str| Aggregator::column_total(table, name);

    let mut summary = RunSummary {
        rows: table.height(),
        grand_total: sum(header::GRAND_TOTAL)?,
        kyobo_offline: sum("교보_오프")?,
        kyobo_online: sum("교보_온")?,
        kyobo_corporate: sum("교보_법인")?,
        dropped_by_retention,
        generated_at: clock.timestamp(),
        ..RunSummary::default()
    };
    for retailer in Retailer::ALL {
        summary.retailer_totals.insert(retailer, sum(retailer.total_header())?);
    }
    Ok(summary)
}

/// Load every retailer ledger concurrently. A missing or unreadable ledger
/// becomes an empty frame.
pub async fn load_ledgers(store: &dyn TableStore, keys: &StorageManager) -> Vec<(Retailer, DataFrame)> {
    let loads = Retailer::ALL.into_iter().map(|retailer| async move {
        let key = keys.ledger_key(retailer);
        let frame = match store.load_table(&key).await {
            Ok(Some(df)) => {
                info!("{}: loaded {} ledger rows from {}", retailer, df.height(), key);
                df
            }
            Ok(None) => {
                warn!("{}: no ledger at {}, treating as empty", retailer, key);
                DataFrame::empty()
            }
            Err(e) => {
                warn!("{}: failed to load ledger {}, treating as empty: {:#}", retailer, key, e);
                DataFrame::empty()
            }
        };
        (retailer, frame)
    });
    join_all(loads).await
}

/// Reconcile the stored ledgers and, unless `dry_run`, replace the stored
/// integrated table.
pub async fn run(
    store: &dyn TableStore,
    keys: &StorageManager,
    reconciler: &Reconciler,
    clock: &RunClock,
    dry_run: bool,
) -> Result<Reconciliation> {
    let ledgers = load_ledgers(store, keys).await;
    let mut reconciliation = reconciler.reconcile(ledgers, clock)?;
    reconciliation.summary.log();

    if dry_run {
        info!("Dry run: integrated table not persisted");
    } else {
        store
            .replace_table(keys.integrated_key(), &mut reconciliation.table)
            .await
            .context("Failed to persist integrated table")?;
        info!("Integrated table written to {}", keys.integrated_key());
    }
    Ok(reconciliation)
}

/// Push the integrated table and, if given, an inventory snapshot to the sink.
pub async fn sync_to_sink(
    table: &DataFrame,
    inventory: Option<&DataFrame>,
    adapter: &SinkAdapter,
    sink: &dyn SalesSink,
    chunk_size: usize,
) -> Result<(SyncReport, Option<SyncReport>)> {
    let records = adapter.melt(table)?;
    let sales = push_sales(sink, &records, chunk_size).await;

    let inventory = match inventory {
        Some(df) => {
            let records = adapter.inventory_records(df)?;
            Some(push_inventory(sink, &records, chunk_size).await)
        }
        None => None,
    };
    Ok((sales, inventory))
}

/// Append one cleaned export to a retailer's ledger.
pub async fn ingest_batch(
    store: &dyn TableStore,
    keys: &StorageManager,
    writer: &LedgerWriter,
    retailer: Retailer,
    batch: DataFrame,
    query_date: NaiveDate,
    clock: &RunClock,
) -> Result<Vec<BatchWarning>> {
    let key = keys.ledger_key(retailer);
    let ledger = store
        .load_table(&key)
        .await
        .with_context(|| format!("Failed to load ledger {}", key))?;

    let batch = writer.prepare_batch(retailer, batch, query_date, clock)?;
    let warnings = writer.validate_batch(retailer, ledger.as_ref(), &batch, query_date)?;

    let mut appended = writer.append(ledger, &batch, clock)?;
    store
        .replace_table(&key, &mut appended)
        .await
        .with_context(|| format!("Failed to write ledger {}", key))?;
    info!("{}: ledger now holds {} rows ({} appended)", retailer, appended.height(), batch.height());
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::frame::{int_values_or_zero, text_values};
    use crate::sink::RecordingSink;
    use crate::storage::MemoryStore;

    fn clock_at(hour: u32) -> RunClock {
        RunClock::at(
            NaiveDate::from_ymd_opt(2026, 1, 11)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    fn ledgers() -> Vec<(Retailer, DataFrame)> {
        vec![
            (
                Retailer::Kyobo,
                df!(
                    "날짜" => ["2026-01-10"],
                    "ISBN" => ["9791234567890"],
                    "도서명" => [""],
                    "저자" => ["김작가"],
                    "정가" => ["18,000"],
                    "판매\n(영업점)" => ["1"],
                    "판매\n(온라인)" => ["2"],
                    "판매\n(법인)" => ["0"],
                    "업로드날짜" => ["2026-01-11"]
                )
                .unwrap(),
            ),
            (
                Retailer::Aladin,
                df!(
                    "날짜" => ["2026-01-10"],
                    "ISBN" => ["9791234567890"],
                    "도서명" => [""],
                    "판매권수" => ["0"],
                    "업로드날짜" => ["2026-01-11"]
                )
                .unwrap(),
            ),
            (
                Retailer::Youngpoong,
                df!(
                    "날짜" => ["2026-01-10"],
                    "바코드" => ["9791234567890"],
                    "도서명" => ["영풍 제목"],
                    "자재그룹내역" => ["소설"],
                    "판매수량" => ["5"],
                    "업로드날짜" => ["2026-01-11"]
                )
                .unwrap(),
            ),
            (
                Retailer::Yes24,
                df!(
                    "날짜" => ["2026-01-10"],
                    "ISBN13" => ["9791234567890"],
                    "상품명" => ["예스 제목"],
                    "당월판매량" => ["2"],
                    "업로드날짜" => ["2026-01-11"],
                    "UpdatedAt" => ["2026-01-11 06:00:00"]
                )
                .unwrap(),
            ),
        ]
    }

    #[test]
    fn test_four_retailer_reconciliation() {
        let result = Reconciler::default().reconcile(ledgers(), &clock_at(9)).unwrap();
        let table = &result.table;

        assert_eq!(table.height(), 1);
        assert_eq!(int_values_or_zero(table, "교보계").unwrap(), vec![3]);
        assert_eq!(int_values_or_zero(table, "알라딘").unwrap(), vec![0]);
        assert_eq!(int_values_or_zero(table, "영풍").unwrap(), vec![5]);
        assert_eq!(int_values_or_zero(table, "YES24").unwrap(), vec![2]);
        assert_eq!(int_values_or_zero(table, "일계").unwrap(), vec![10]);
        assert_eq!(text_values(table, "도서명").unwrap(), vec!["영풍 제목"]);
        assert_eq!(text_values(table, "저자").unwrap(), vec!["김작가"]);
        assert_eq!(text_values(table, "장르").unwrap(), vec!["소설"]);
        assert_eq!(text_values(table, "요일").unwrap(), vec!["토"]);
        assert_eq!(text_values(table, "UpdatedAt_yes24").unwrap(), vec!["2026-01-11 06:00:00"]);

        assert_eq!(result.summary.grand_total, 10);
        assert_eq!(result.summary.kyobo_online, 2);
        assert_eq!(result.summary.retailer_totals[&Retailer::Youngpoong], 5);
    }

    #[test]
    fn test_rerun_differs_only_in_run_timestamp() {
        let reconciler = Reconciler::default();
        let first = reconciler.reconcile(ledgers(), &clock_at(9)).unwrap().table;
        let second = reconciler.reconcile(ledgers(), &clock_at(10)).unwrap().table;

        assert!(
            first
                .drop(header::GENERATED_AT)
                .unwrap()
                .equals(&second.drop(header::GENERATED_AT).unwrap())
        );
        assert_ne!(
            text_values(&first, header::GENERATED_AT).unwrap(),
            text_values(&second, header::GENERATED_AT).unwrap()
        );
    }

    #[test]
    fn test_unparseable_isbns_are_not_fused_across_retailers() {
        let ledgers = vec![
            (
                Retailer::Kyobo,
                df!(
                    "날짜" => ["2026-01-10", "2026-01-10"],
                    "ISBN" => ["bad1", "bad2"],
                    "도서명" => ["Kyobo A", "Kyobo B"],
                    "판매\n(영업점)" => ["1", "2"],
                    "업로드날짜" => ["2026-01-11", "2026-01-11"]
                )
                .unwrap(),
            ),
            (
                Retailer::Aladin,
                df!(
                    "날짜" => ["2026-01-10", "2026-01-10"],
                    "ISBN" => ["x", "y"],
                    "도서명" => ["Aladin X", "Aladin Y"],
                    "판매권수" => ["3", "4"],
                    "업로드날짜" => ["2026-01-11", "2026-01-11"]
                )
                .unwrap(),
            ),
        ];

        let result = Reconciler::default().reconcile(ledgers, &clock_at(9)).unwrap();
        let table = &result.table;

        assert_eq!(table.height(), 4);
        let mut titles = text_values(table, "도서명").unwrap();
        titles.sort();
        assert_eq!(titles, vec!["Aladin X", "Aladin Y", "Kyobo A", "Kyobo B"]);
        assert_eq!(result.summary.grand_total, 10);
        assert_eq!(result.summary.retailer_totals[&Retailer::Kyobo], 3);
        assert_eq!(result.summary.retailer_totals[&Retailer::Aladin], 7);
    }

    #[test]
    fn test_row_missing_its_date_stays_separate() {
        let ledgers = vec![
            (
                Retailer::Kyobo,
                df!(
                    "날짜" => ["", "2026-01-10"],
                    "ISBN" => ["9791234567890", "9791234567890"],
                    "판매\n(영업점)" => ["4", "1"],
                    "업로드날짜" => ["2026-01-11", "2026-01-11"]
                )
                .unwrap(),
            ),
            (
                Retailer::Yes24,
                df!(
                    "날짜" => ["", "2026-01-10"],
                    "ISBN13" => ["9791234567890", "9791234567890"],
                    "당월판매량" => ["6", "2"],
                    "업로드날짜" => ["2026-01-11", "2026-01-11"]
                )
                .unwrap(),
            ),
        ];

        let result = Reconciler::default().reconcile(ledgers, &clock_at(9)).unwrap();
        let table = &result.table;

        // The dated rows join; each undated row stands alone
        assert_eq!(table.height(), 3);
        let mut totals = int_values_or_zero(table, "일계").unwrap();
        totals.sort();
        assert_eq!(totals, vec![3, 4, 6]);
        assert_eq!(result.summary.grand_total, 13);
    }

    #[test]
    fn test_no_ledgers_yields_empty_table() {
        let empty = Retailer::ALL.into_iter().map(|r| (r, DataFrame::empty())).collect();
        let result = Reconciler::default().reconcile(empty, &clock_at(9)).unwrap();
        assert_eq!(result.table.height(), 0);
        assert_eq!(result.summary.grand_total, 0);
    }

    #[tokio::test]
    async fn test_run_persists_and_syncs() {
        let store = MemoryStore::new();
        let keys = StorageManager::default();
        for (retailer, mut df) in ledgers() {
            store.replace_table(&keys.ledger_key(retailer), &mut df).await.unwrap();
        }

        let result = run(&store, &keys, &Reconciler::default(), &clock_at(9), false)
            .await
            .unwrap();
        let stored = store.load_table(keys.integrated_key()).await.unwrap().unwrap();
        assert!(stored.equals(&result.table));

        let sink = RecordingSink::new();
        let (sales, inventory) = sync_to_sink(&stored, None, &SinkAdapter::default(), &sink, 500)
            .await
            .unwrap();
        assert_eq!(sales.records_sent, 2);
        assert!(inventory.is_none());

        let stores: Vec<String> = sink.sales().await.into_iter().map(|r| r.bookstore).collect();
        assert_eq!(stores, vec!["교보", "YES24"]);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let store = MemoryStore::new();
        let keys = StorageManager::default();
        run(&store, &keys, &Reconciler::default(), &clock_at(9), true).await.unwrap();
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_batch_appends_to_ledger() {
        let store = MemoryStore::new();
        let keys = StorageManager::default();
        let writer = LedgerWriter::default();
        let day = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();

        let batch = df!("ISBN" => ["9791234567890"], "판매권수" => ["2권"]).unwrap();
        let warnings = ingest_batch(&store, &keys, &writer, Retailer::Aladin, batch, day, &clock_at(9))
            .await
            .unwrap();
        assert!(warnings.is_empty());

        let again = df!("ISBN" => ["9788937460449"], "판매권수" => ["1"]).unwrap();
        let warnings = ingest_batch(&store, &keys, &writer, Retailer::Aladin, again, day, &clock_at(9))
            .await
            .unwrap();
        assert_eq!(warnings, vec![BatchWarning::DuplicateDate("2026-01-10".to_string())]);

        let ledger = store.load_table(&keys.ledger_key(Retailer::Aladin)).await.unwrap().unwrap();
        assert_eq!(ledger.height(), 2);
        assert_eq!(text_values(&ledger, "판매권수").unwrap(), vec!["2", "1"]);
    }
}
