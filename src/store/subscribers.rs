/**
 * Per-user subscriber configuration and the derived pod-subscriber index.
 *
 * Every mutation is a scoped read-modify-write under that user's lock. When a
 * mutation moves `monitored` to or from empty, the index record is rewritten
 * in the same storage batch, so the index never disagrees with the configs.
 * Lock order is always user lock, then index lock.
 */
use super::Storage;
use crate::config::DEFAULT_NAMESPACE;
use crate::error::Result;
use k8s_openapi::serde_json;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SUBSCRIBER_PREFIX: &str = "subscriber:";
const INDEX_KEY: &str = "subscriber-index";

/// Minimum severity a subscriber wants delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    All,
    Warn,
    Error,
}

impl Verbosity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Default namespace for namespace-scoped commands. Not a watch filter.
    pub namespace: String,
    /// Pod names this user wants events for
    #[serde(default)]
    pub monitored: BTreeSet<String>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            monitored: BTreeSet::new(),
            verbosity: Verbosity::default(),
        }
    }
}

impl SubscriberConfig {
    #[must_use]
    pub fn is_pod_subscriber(&self) -> bool {
        !self.monitored.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Added,
    AlreadyMonitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmonitorOutcome {
    Removed,
    NotMonitoring,
}

pub struct SubscriberStore {
    storage: Arc<dyn Storage>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    index_lock: Mutex<()>,
}

impl SubscriberStore {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            user_locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
        }
    }

    fn key(user: &str) -> String {
        format!("{SUBSCRIBER_PREFIX}{user}")
    }

    async fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .lock()
            .await
            .entry(user.to_string())
            .or_default()
            .clone()
    }

    /// Drop the map entry for `user` once nobody else holds or waits on it
    async fn release_user_lock(&self, user: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        drop(lock);
        if locks.get(user).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(user);
        }
    }

    async fn read_index(&self) -> Result<BTreeSet<String>> {
        match self.storage.load(INDEX_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Momentary read of one user's config. Writes are whole-object, so this
    /// never sees a partial update.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or the record cannot be decoded
    pub async fn get(&self, user: &str) -> Result<Option<SubscriberConfig>> {
        match self.storage.load(&Self::key(user)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Config for `user`, persisting a default one on first contact
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn get_or_create(&self, user: &str) -> Result<SubscriberConfig> {
        let (config, ()) = self.update(user, |_| ()).await?;
        Ok(config)
    }

    /// Scoped read-modify-write of one user's config.
    ///
    /// Returns the persisted config and whatever `mutate` returned.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails; nothing is written in that case
    pub async fn update<R, F>(&self, user: &str, mutate: F) -> Result<(SubscriberConfig, R)>
    where
        F: FnOnce(&mut SubscriberConfig) -> R + Send,
        R: Send,
    {
        let lock = self.user_lock(user).await;
        let result = {
            let _user_guard = lock.lock().await;
            self.update_locked(user, mutate).await
        };
        self.release_user_lock(user, lock).await;
        result
    }

    /// Read-modify-write body of `update`; caller holds the user lock
    async fn update_locked<R, F>(&self, user: &str, mutate: F) -> Result<(SubscriberConfig, R)>
    where
        F: FnOnce(&mut SubscriberConfig) -> R + Send,
        R: Send,
    {
        let existing = self.get(user).await?;
        let created = existing.is_none();
        let before = existing.unwrap_or_default();
        let mut after = before.clone();
        let out = mutate(&mut after);

        if !created && after == before {
            return Ok((after, out));
        }

        let mut writes = vec![(Self::key(user), serde_json::to_value(&after)?)];
        if before.is_pod_subscriber() == after.is_pod_subscriber() {
            self.storage.store_batch(writes).await?;
        } else {
            let _index_guard = self.index_lock.lock().await;
            let mut index = self.read_index().await?;
            if after.is_pod_subscriber() {
                index.insert(user.to_string());
                debug!("{} joined the pod subscriber index", user);
            } else {
                index.remove(user);
                debug!("{} left the pod subscriber index", user);
            }
            writes.push((INDEX_KEY.to_string(), serde_json::to_value(&index)?));
            self.storage.store_batch(writes).await?;
        }

        if created {
            info!("created subscriber config for {}", user);
        }
        Ok((after, out))
    }

    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn monitor(&self, user: &str, pod: &str) -> Result<MonitorOutcome> {
        let (_, outcome) = self
            .update(user, |config| {
                if config.monitored.insert(pod.to_string()) {
                    MonitorOutcome::Added
                } else {
                    MonitorOutcome::AlreadyMonitoring
                }
            })
            .await?;
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn unmonitor(&self, user: &str, pod: &str) -> Result<UnmonitorOutcome> {
        let (_, outcome) = self
            .update(user, |config| {
                if config.monitored.remove(pod) {
                    UnmonitorOutcome::Removed
                } else {
                    UnmonitorOutcome::NotMonitoring
                }
            })
            .await?;
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn set_verbosity(&self, user: &str, verbosity: Verbosity) -> Result<SubscriberConfig> {
        let (config, ()) = self.update(user, |c| c.verbosity = verbosity).await?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn set_namespace(&self, user: &str, namespace: &str) -> Result<SubscriberConfig> {
        let (config, ()) = self
            .update(user, |c| c.namespace = namespace.to_string())
            .await?;
        Ok(config)
    }

    /// Users with at least one monitored pod
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn pod_subscribers(&self) -> Result<Vec<String>> {
        Ok(self.read_index().await?.into_iter().collect())
    }

    /// Every user that has a config
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn all_subscribers(&self) -> Result<Vec<String>> {
        let keys = self.storage.keys_with_prefix(SUBSCRIBER_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(SUBSCRIBER_PREFIX).map(str::to_string))
            .collect())
    }

    /// Rebuild the index from the stored configs. Run at startup so a store
    /// written by an older or interrupted process still satisfies the index
    /// invariant. Returns the number of entries that changed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn reconcile_index(&self) -> Result<usize> {
        let _index_guard = self.index_lock.lock().await;
        let stored = self.read_index().await?;

        let mut derived = BTreeSet::new();
        for user in self.all_subscribers().await? {
            if let Some(config) = self.get(&user).await? {
                if config.is_pod_subscriber() {
                    derived.insert(user);
                }
            }
        }

        let changed = stored.symmetric_difference(&derived).count();
        if changed > 0 {
            warn!("subscriber index was out of date ({} entries), rewriting", changed);
            self.storage
                .store_batch(vec![(INDEX_KEY.to_string(), serde_json::to_value(&derived)?)])
                .await?;
        }
        Ok(changed)
    }
}
