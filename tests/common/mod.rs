#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::serde_json::json;
use kubenotify::chat::ChatTransport;
use kubenotify::error::{Error, Result};
use kubenotify::k8s::{RawWatchItem, RawWatchStream, ResourceApi, ResourceKind, ResourceSummary, WatchScope};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Resource API whose watch streams are fed by the test.
/// Each `watch` call takes the next scripted stream; once they run out the
/// stream never yields.
#[derive(Default)]
pub struct ScriptedApi {
    sessions: Mutex<VecDeque<mpsc::Receiver<Result<RawWatchItem>>>>,
    opens: AtomicUsize,
}

impl ScriptedApi {
    /// Queue a session and return the sender that feeds it
    pub fn script_session(&self) -> mpsc::Sender<Result<RawWatchItem>> {
        let (tx, rx) = mpsc::channel(1);
        self.sessions.lock().unwrap().push_back(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceApi for ScriptedApi {
    async fn list_all(&self, _kind: ResourceKind, _scope: &WatchScope) -> Result<Vec<ResourceSummary>> {
        Ok(vec![])
    }

    async fn watch(&self, _kind: ResourceKind, _scope: &WatchScope) -> Result<RawWatchStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        Ok(match next {
            Some(rx) => ReceiverStream::new(rx).boxed(),
            None => futures::stream::pending().boxed(),
        })
    }

    async fn delete(
        &self,
        _kind: ResourceKind,
        _name: &str,
        _namespace: Option<&str>,
        _context: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

/// Chat transport that records every delivery. Users in `unreachable`
/// cannot be resolved; `latency` delays each send before it is recorded.
#[derive(Default)]
pub struct RecordingTransport {
    pub unreachable: HashSet<String>,
    pub latency: Option<Duration>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn with_unreachable(users: &[&str]) -> Self {
        Self {
            unreachable: users.iter().map(|u| (*u).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn resolve(&self, user: &str) -> Result<String> {
        if self.unreachable.contains(user) {
            return Err(Error::Custom(format!("{user} has no chat id")));
        }
        Ok(format!("@{user}"))
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn pod_item(event_type: &str, name: &str, phase: &str) -> Result<RawWatchItem> {
    Ok(RawWatchItem::new(
        event_type,
        json!({
            "metadata": {"name": name, "namespace": "default"},
            "status": {"phase": phase}
        }),
    ))
}
