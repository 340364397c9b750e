use super::event::WatchEvent;
use crate::error::{Result, StreamTerminated};
use crate::k8s::{RawWatchStream, ResourceApi, ResourceKind, WatchScope};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, trace};

/// HTTP 410: the resource version we watched from is gone
const GONE: u64 = 410;

/// One live watch stream for one resource kind.
///
/// Items are pulled from the upstream only when `next_event` is called, so a
/// slow consumer holds back the API server rather than queueing events here.
pub struct WatchSession {
    kind: ResourceKind,
    stream: RawWatchStream,
    idle_timeout: Option<Duration>,
    terminated: bool,
}

impl WatchSession {
    /// Open a fresh watch on `kind` through `api`
    ///
    /// # Errors
    ///
    /// Returns an error if the watch cannot be established
    pub async fn open(
        api: &dyn ResourceApi,
        kind: ResourceKind,
        scope: &WatchScope,
        idle_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = api.watch(kind, scope).await?;
        Ok(Self::new(kind, stream, idle_timeout))
    }

    #[must_use]
    pub fn new(kind: ResourceKind, stream: RawWatchStream, idle_timeout: Option<Duration>) -> Self {
        Self {
            kind,
            stream,
            idle_timeout,
            terminated: false,
        }
    }

    /// Next normalized event, or the reason the stream ended.
    /// After the first `Err` every further call returns `Closed`.
    ///
    /// # Errors
    ///
    /// Returns `StreamTerminated` when the transport closes, fails, goes idle
    /// past the limit, or the server expires our resource version
    pub async fn next_event(&mut self) -> std::result::Result<WatchEvent, StreamTerminated> {
        if self.terminated {
            return Err(StreamTerminated::Closed);
        }
        let result = self.pull().await;
        if result.is_err() {
            self.terminated = true;
        }
        result
    }

    async fn pull(&mut self) -> std::result::Result<WatchEvent, StreamTerminated> {
        loop {
            let pulled = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, self.stream.next())
                    .await
                    .map_err(|_| StreamTerminated::TimedOut(limit))?,
                None => self.stream.next().await,
            };

            let raw = match pulled {
                None => return Err(StreamTerminated::Closed),
                Some(Err(e)) => return Err(StreamTerminated::Transport(e.to_string())),
                Some(Ok(raw)) => raw,
            };

            if raw.event_type == "ERROR" && WatchEvent::error_code(&raw) == Some(GONE) {
                debug!("{} watch resource version expired", self.kind);
                return Err(StreamTerminated::Expired);
            }

            match WatchEvent::from_raw(self.kind, &raw) {
                Some(event) => return Ok(event),
                None => trace!("skipping {} item on {} watch", raw.event_type, self.kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::k8s::RawWatchItem;
    use crate::k8s::resource_api::BOOKMARK;
    use crate::watch::event::EventType;
    use k8s_openapi::serde_json::json;

    fn pod_item(event_type: &str, name: &str) -> Result<RawWatchItem> {
        Ok(RawWatchItem::new(
            event_type,
            json!({"metadata": {"name": name, "namespace": "default"}}),
        ))
    }

    fn session(items: Vec<Result<RawWatchItem>>) -> WatchSession {
        WatchSession::new(ResourceKind::Pod, futures::stream::iter(items).boxed(), None)
    }

    #[tokio::test]
    async fn test_events_in_order_then_closed() {
        let mut session = session(vec![pod_item("ADDED", "a"), pod_item("MODIFIED", "a")]);

        let first = session.next_event().await.unwrap();
        assert_eq!((first.event_type, first.name.as_str()), (EventType::Added, "a"));
        let second = session.next_event().await.unwrap();
        assert_eq!(second.event_type, EventType::Modified);

        assert_eq!(session.next_event().await, Err(StreamTerminated::Closed));
        assert_eq!(session.next_event().await, Err(StreamTerminated::Closed));
    }

    #[tokio::test]
    async fn test_transport_error_terminates() {
        let mut session = session(vec![
            Err(Error::Custom("connection reset".to_string())),
            pod_item("ADDED", "late"),
        ]);
        assert_eq!(
            session.next_event().await,
            Err(StreamTerminated::Transport("connection reset".to_string()))
        );
        assert_eq!(session.next_event().await, Err(StreamTerminated::Closed));
    }

    #[tokio::test]
    async fn test_garbage_error_item_is_degenerate_event() {
        let mut session = session(vec![
            Ok(RawWatchItem::new("ERROR", json!(null))),
            pod_item("ADDED", "a"),
        ]);
        let degenerate = session.next_event().await.unwrap();
        assert_eq!(degenerate.event_type, EventType::Error);
        assert_eq!(session.next_event().await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_expired_version_terminates() {
        let mut session = session(vec![Ok(RawWatchItem::new(
            "ERROR",
            json!({"code": 410, "message": "too old resource version"}),
        ))]);
        assert_eq!(session.next_event().await, Err(StreamTerminated::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_times_out() {
        let limit = Duration::from_secs(5);
        let mut session = WatchSession::new(
            ResourceKind::Pod,
            futures::stream::pending().boxed(),
            Some(limit),
        );
        assert_eq!(session.next_event().await, Err(StreamTerminated::TimedOut(limit)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bookmarks_keep_quiet_stream_alive() {
        let limit = Duration::from_secs(300);
        let spaced = futures::stream::iter(vec![
            (200, Ok(RawWatchItem::new(BOOKMARK, json!({"metadata": {"resourceVersion": "8"}})))),
            (200, pod_item("MODIFIED", "a")),
        ])
        .then(|(delay, item)| async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            item
        })
        .boxed();
        let mut session = WatchSession::new(ResourceKind::Pod, spaced, Some(limit));

        let event = session.next_event().await.unwrap();
        assert_eq!((event.event_type, event.name.as_str()), (EventType::Modified, "a"));
    }
}
