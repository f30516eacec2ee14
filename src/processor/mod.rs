pub mod aggregator;
pub mod column_mapper;
pub mod fallback_resolver;
pub mod frame;
pub mod ledger;
pub mod merge_engine;
pub mod normalizer;
pub mod sink_adapter;

pub use aggregator::{Aggregator, FinalTable, RetentionPolicy};
pub use column_mapper::{ColumnMapper, RetailerProfile};
pub use fallback_resolver::{FallbackResolver, ResolvedTable};
pub use ledger::{BatchWarning, LedgerWriter};
pub use merge_engine::{MergeEngine, MergedFrame};
pub use sink_adapter::SinkAdapter;
