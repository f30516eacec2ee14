pub mod minio_client;
pub mod storage_manager;
pub mod table_store;

pub use minio_client::MinioStorage;
pub use storage_manager::StorageManager;
pub use table_store::{MemoryStore, TableStore};
