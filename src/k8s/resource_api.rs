use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::serde_json::Value;
use std::fmt;

/// Kinds of cluster resources we can list, watch and delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Namespace,
}

impl ResourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Namespace => "namespace",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a call is aimed: an optional namespace inside an optional kube context.
/// `None` namespace means cluster wide, `None` context means the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchScope {
    pub namespace: Option<String>,
    pub context: Option<String>,
}

/// One row of a snapshot listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub phase: Option<String>,
    pub ip: Option<String>,
    pub age: String,
}

/// Event type of a watch item that only advances the resource version
pub const BOOKMARK: &str = "BOOKMARK";

/// One undecoded item from a watch stream: the event type as sent by the
/// server (`ADDED`, `MODIFIED`, `DELETED`, `ERROR`, `BOOKMARK`) and the
/// object payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWatchItem {
    pub event_type: String,
    pub object: Value,
}

impl RawWatchItem {
    #[must_use]
    pub fn new(event_type: impl Into<String>, object: Value) -> Self {
        Self {
            event_type: event_type.into(),
            object,
        }
    }
}

/// Live event stream. Ends (or yields `Err`) when the transport goes away.
pub type RawWatchStream = BoxStream<'static, Result<RawWatchItem>>;

/// The cluster as seen by the rest of the crate
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Snapshot of every resource of `kind` in `scope`
    async fn list_all(&self, kind: ResourceKind, scope: &WatchScope) -> Result<Vec<ResourceSummary>>;

    /// Open a live stream of changes to `kind` in `scope`, starting now
    async fn watch(&self, kind: ResourceKind, scope: &WatchScope) -> Result<RawWatchStream>;

    /// Delete one resource. `namespace` is ignored for cluster scoped kinds.
    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        context: Option<&str>,
    ) -> Result<()>;

    /// Names of the configured kube contexts, current one first
    async fn contexts(&self) -> Result<Vec<String>>;
}
