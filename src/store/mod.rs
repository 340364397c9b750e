/**
 * Durable key-value storage and the subscriber records kept in it
 */
pub mod memory;
pub mod sqlite;
pub mod subscribers;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use subscribers::{MonitorOutcome, SubscriberConfig, SubscriberStore, UnmonitorOutcome, Verbosity};

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::serde_json::Value;

/// Opaque string keys mapped to structured values
#[async_trait]
pub trait Storage: Send + Sync {
    /// Current value of `key`, `None` if never written
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Write every pair or none of them
    async fn store_batch(&self, writes: Vec<(String, Value)>) -> Result<()>;

    /// All keys starting with `prefix`, sorted
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
