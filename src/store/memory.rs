use super::Storage;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local storage, used by tests and `--db :memory:`
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store_batch(&self, writes: Vec<(String, Value)>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.extend(writes);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
