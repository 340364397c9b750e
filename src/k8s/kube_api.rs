/**
 * Kubernetes-backed `ResourceApi`
 *
 * Snapshots go through the shared client cache with one refresh-and-retry on
 * auth errors. Watches are opened at the current resource version and read
 * only as fast as the consumer pulls. A server-side watch timeout resumes at
 * the last seen version instead of ending the stream.
 */
use super::client_manager::{get_client, refresh_client, should_refresh_client};
use super::resource_api::{BOOKMARK, RawWatchItem, RawWatchStream, ResourceApi, ResourceKind, ResourceSummary, WatchScope};
use super::{namespaces, pods};
use crate::config::{DEFAULT_NAMESPACE, WATCH_RESUME_DELAY_SECONDS, WATCH_TIMEOUT_SECONDS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::serde_json::{self, Value, json};
use kube::api::{Api, DeleteParams, ListParams, WatchEvent as KubeWatchEvent, WatchParams};
use kube::config::Kubeconfig;
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct KubeResourceApi {
    watch_timeout_secs: u32,
}

impl Default for KubeResourceApi {
    fn default() -> Self {
        Self::new(WATCH_TIMEOUT_SECONDS)
    }
}

impl KubeResourceApi {
    #[must_use]
    pub const fn new(watch_timeout_secs: u32) -> Self {
        Self { watch_timeout_secs }
    }
}

/// Run `call` with the cached client, refreshing it once on an auth failure
async fn with_refresh<T, F, Fut>(context: Option<&str>, call: F) -> Result<T>
where
    F: Fn(Client) -> Fut,
    Fut: Future<Output = std::result::Result<T, kube::Error>>,
{
    let client = get_client(context).await?;
    match call((*client).clone()).await {
        Ok(value) => Ok(value),
        Err(e) if should_refresh_client(&e) => {
            debug!("refreshing client due to auth error: {}", e);
            let client = refresh_client(context).await?;
            Ok(call((*client).clone()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Convert a kube watch event into the raw `(type, object)` pair.
/// Bookmarks pass through as `BOOKMARK` items carrying only the resource version.
fn raw_item<K: Serialize>(event: KubeWatchEvent<K>) -> RawWatchItem {
    let (event_type, object) = match event {
        KubeWatchEvent::Added(obj) => ("ADDED", serde_json::to_value(obj)),
        KubeWatchEvent::Modified(obj) => ("MODIFIED", serde_json::to_value(obj)),
        KubeWatchEvent::Deleted(obj) => ("DELETED", serde_json::to_value(obj)),
        KubeWatchEvent::Bookmark(bookmark) => {
            return bookmark_item(&bookmark.metadata.resource_version);
        }
        KubeWatchEvent::Error(err) => (
            "ERROR",
            Ok(json!({
                "status": err.status,
                "message": err.message,
                "reason": err.reason,
                "code": err.code,
            })),
        ),
    };
    RawWatchItem::new(event_type, object.unwrap_or(Value::Null))
}

fn bookmark_item(version: &str) -> RawWatchItem {
    RawWatchItem::new(BOOKMARK, json!({"metadata": {"resourceVersion": version}}))
}

/// Resource version the server reported with `event`, if any
fn resource_version<K: Resource>(event: &KubeWatchEvent<K>) -> Option<String> {
    match event {
        KubeWatchEvent::Added(obj) | KubeWatchEvent::Modified(obj) | KubeWatchEvent::Deleted(obj) => {
            obj.meta().resource_version.clone()
        }
        KubeWatchEvent::Bookmark(bookmark) => Some(bookmark.metadata.resource_version.clone()),
        KubeWatchEvent::Error(_) => None,
    }
}

type KubeEventStream<K> = BoxStream<'static, kube::Result<KubeWatchEvent<K>>>;

struct Resume<K, F> {
    open: F,
    version: String,
    stream: KubeEventStream<K>,
}

/// Lazily drain `stream`, reopening through `open` at the last seen resource
/// version whenever the server ends a watch cleanly.
///
/// Upstream is only polled when the returned stream is, so at most one item
/// is in flight. Each reopen is preceded by `resume_delay` and announced with
/// a `BOOKMARK` item. Transport errors end the stream after being yielded.
fn resuming<K, F, Fut>(
    open: F,
    version: String,
    stream: KubeEventStream<K>,
    resume_delay: Duration,
) -> RawWatchStream
where
    K: Resource + Serialize + Send + 'static,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = kube::Result<KubeEventStream<K>>> + Send,
{
    let state = Resume { open, version, stream };
    futures::stream::unfold(Some(state), move |state| async move {
        let mut state = state?;
        match state.stream.next().await {
            Some(Ok(event)) => {
                if let Some(version) = resource_version(&event) {
                    state.version = version;
                }
                Some((Ok(raw_item(event)), Some(state)))
            }
            Some(Err(e)) => Some((Err(Error::from(e)), None)),
            None => {
                tokio::time::sleep(resume_delay).await;
                debug!("watch ended cleanly, resuming at resource version {}", state.version);
                let reopened = (state.open)(state.version.clone()).await;
                match reopened {
                    Ok(stream) => {
                        state.stream = stream;
                        let marker = bookmark_item(&state.version);
                        Some((Ok(marker), Some(state)))
                    }
                    Err(e) => Some((Err(Error::from(e)), None)),
                }
            }
        }
    })
    .boxed()
}

/// Open a watch on `api` starting at the current resource version.
///
/// Open failures come back as `Err`; later failures end the stream.
async fn watch_from_now<K>(api: Api<K>, timeout_secs: u32) -> Result<RawWatchStream>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    let list = api.list_metadata(&ListParams::default().limit(1)).await?;
    let version = list
        .metadata
        .resource_version
        .unwrap_or_else(|| "0".to_string());
    let params = WatchParams::default().timeout(timeout_secs);
    let stream = api.watch(&params, &version).await?.boxed();
    debug!("watch opened at resource version {}", version);

    let open = move |version: String| {
        let api = api.clone();
        let params = params.clone();
        async move { api.watch(&params, &version).await.map(StreamExt::boxed) }
    };
    Ok(resuming(
        open,
        version,
        stream,
        Duration::from_secs(WATCH_RESUME_DELAY_SECONDS),
    ))
}

#[async_trait]
impl ResourceApi for KubeResourceApi {
    async fn list_all(&self, kind: ResourceKind, scope: &WatchScope) -> Result<Vec<ResourceSummary>> {
        let namespace = scope.namespace.as_deref();
        match kind {
            ResourceKind::Pod => {
                with_refresh(scope.context.as_deref(), |client| pods::list_pods(client, namespace)).await
            }
            ResourceKind::Namespace => {
                with_refresh(scope.context.as_deref(), namespaces::list_namespaces).await
            }
        }
    }

    async fn watch(&self, kind: ResourceKind, scope: &WatchScope) -> Result<RawWatchStream> {
        let client = (*get_client(scope.context.as_deref()).await?).clone();
        info!(
            "🔍 Opening {} watch (namespace: {})",
            kind,
            scope.namespace.as_deref().unwrap_or("*")
        );
        match kind {
            ResourceKind::Pod => {
                let api: Api<Pod> = match scope.namespace.as_deref() {
                    Some(ns) => Api::namespaced(client, ns),
                    None => Api::all(client),
                };
                watch_from_now(api, self.watch_timeout_secs).await
            }
            ResourceKind::Namespace => {
                let api: Api<Namespace> = Api::all(client);
                watch_from_now(api, self.watch_timeout_secs).await
            }
        }
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        context: Option<&str>,
    ) -> Result<()> {
        let dp = DeleteParams::default();
        match kind {
            ResourceKind::Pod => {
                let ns = namespace.unwrap_or(DEFAULT_NAMESPACE);
                with_refresh(context, |client| {
                    let dp = dp.clone();
                    async move {
                        let api: Api<Pod> = Api::namespaced(client, ns);
                        api.delete(name, &dp).await.map(|_| ())
                    }
                })
                .await?;
            }
            ResourceKind::Namespace => {
                with_refresh(context, |client| {
                    let dp = dp.clone();
                    async move {
                        let api: Api<Namespace> = Api::all(client);
                        api.delete(name, &dp).await.map(|_| ())
                    }
                })
                .await?;
            }
        }
        info!("🗑️  {} {} deleted", kind, name);
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        let kubeconfig = Kubeconfig::read()?;
        let current = kubeconfig.current_context.clone();
        let mut names: Vec<String> = kubeconfig.contexts.into_iter().map(|c| c.name).collect();
        if let Some(current) = current {
            names.sort_by_key(|name| *name != current);
        }
        Ok(names)
    }
}
