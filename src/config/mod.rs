pub mod minio_config;
pub mod pipeline_config;

pub use minio_config::{MinioConfig, StoreCredentials};
pub use pipeline_config::{
    ClockSection, LedgerSection, PipelineConfig, RetentionSection, SinkSection, StorageSection,
};
