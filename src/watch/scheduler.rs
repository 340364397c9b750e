/**
 * Poller task lifecycle
 *
 * Each task owns one resource kind: open a watch session, route events until
 * the stream terminates, wait out the quiescence interval, and reopen. Stop is
 * cooperative: the loop checks its cancellation token between events and
 * during waits, never in the middle of a fan-out.
 */
use super::router::EventRouter;
use super::session::WatchSession;
use crate::config::WatchConfig;
use crate::error::Result;
use crate::k8s::{ResourceApi, ResourceKind, WatchScope};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Opens a fresh watch session each time a task (re)starts
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<WatchSession>;
}

/// Watch one kind in one scope through a `ResourceApi`
pub struct WatchTarget {
    pub api: Arc<dyn ResourceApi>,
    pub kind: ResourceKind,
    pub scope: WatchScope,
    pub idle_timeout: Option<Duration>,
}

#[async_trait]
impl SessionFactory for WatchTarget {
    async fn open(&self) -> Result<WatchSession> {
        WatchSession::open(self.api.as_ref(), self.kind, &self.scope, self.idle_timeout).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Running,
}

impl TaskState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

/// Inspectable view of one poller task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerTask {
    pub name: String,
    pub state: TaskState,
    /// Sessions opened after the first one
    pub restarts: u64,
    pub last_termination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct TaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    status: Arc<RwLock<PollerTask>>,
}

pub struct PollerScheduler {
    config: WatchConfig,
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl PollerScheduler {
    #[must_use]
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start the named task unless it is already running
    pub async fn start_task(
        &self,
        name: &str,
        factory: Arc<dyn SessionFactory>,
        router: Arc<EventRouter>,
    ) -> StartOutcome {
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(name) {
            if !existing.join.is_finished() {
                info!("🔁 {} watcher already running", name);
                return StartOutcome::AlreadyRunning;
            }
        }

        let cancel = CancellationToken::new();
        let status = Arc::new(RwLock::new(PollerTask {
            name: name.to_string(),
            state: TaskState::Running,
            restarts: 0,
            last_termination: None,
        }));
        let join = tokio::spawn(run_task(
            name.to_string(),
            factory,
            router,
            self.config.clone(),
            cancel.clone(),
            status.clone(),
        ));
        tasks.insert(
            name.to_string(),
            TaskHandle {
                cancel,
                join,
                status,
            },
        );
        info!("🔍 Started {} watcher", name);
        StartOutcome::Started
    }

    /// Stop the named task. Once this returns the task routes no more events.
    pub async fn stop_task(&self, name: &str) -> StopOutcome {
        let handle = self.tasks.lock().await.remove(name);
        let Some(handle) = handle else {
            return StopOutcome::NotRunning;
        };
        let was_running = !handle.join.is_finished();

        handle.cancel.cancel();
        if let Err(e) = handle.join.await {
            error!("❌ {} watcher ended abnormally: {}", name, e);
        }

        if was_running {
            info!("🛑 Stopped {} watcher", name);
            StopOutcome::Stopped
        } else {
            StopOutcome::NotRunning
        }
    }

    /// Stop every task
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.tasks.lock().await.keys().cloned().collect();
        for name in names {
            self.stop_task(&name).await;
        }
    }

    /// Snapshot of all known tasks, sorted by name
    pub async fn tasks(&self) -> Vec<PollerTask> {
        let tasks = self.tasks.lock().await;
        let mut snapshot: Vec<PollerTask> = tasks
            .values()
            .filter_map(|handle| handle.status.read().ok().map(|status| status.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    pub async fn state(&self, name: &str) -> TaskState {
        let tasks = self.tasks.lock().await;
        tasks
            .get(name)
            .and_then(|handle| handle.status.read().ok().map(|status| status.state))
            .unwrap_or(TaskState::Stopped)
    }
}

fn update_status(status: &RwLock<PollerTask>, apply: impl FnOnce(&mut PollerTask)) {
    if let Ok(mut status) = status.write() {
        apply(&mut status);
    }
}

async fn run_task(
    name: String,
    factory: Arc<dyn SessionFactory>,
    router: Arc<EventRouter>,
    config: WatchConfig,
    cancel: CancellationToken,
    status: Arc<RwLock<PollerTask>>,
) {
    let mut consecutive_restarts: u32 = 0;

    loop {
        let opened = tokio::select! {
            () = cancel.cancelled() => break,
            opened = factory.open() => opened,
        };

        match opened {
            Ok(mut session) => {
                info!("📡 {} watch session open", name);
                loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        next = session.next_event() => Some(next),
                    };
                    match next {
                        None => break,
                        Some(Ok(event)) => {
                            router.route(&event).await;
                            consecutive_restarts = 0;
                            if cancel.is_cancelled() {
                                break;
                            }
                        }
                        Some(Err(terminated)) => {
                            warn!("⚠️  {} watch terminated: {}", name, terminated);
                            record_termination(&status, terminated.to_string());
                            break;
                        }
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            Err(e) => {
                warn!("⚠️  {} watch failed to open: {}", name, e);
                record_termination(&status, e.to_string());
            }
        }

        consecutive_restarts = consecutive_restarts.saturating_add(1);
        if let Some(max) = config.max_restarts {
            if consecutive_restarts > max {
                error!(
                    "❌ {} watcher exceeded maximum restart attempts ({}), stopping",
                    name, max
                );
                break;
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.restart_delay) => {}
        }
        update_status(&status, |s| s.restarts += 1);
        info!("🔄 Restarting {} watcher", name);
    }

    update_status(&status, |s| s.state = TaskState::Stopped);
}

fn record_termination(status: &RwLock<PollerTask>, reason: String) {
    update_status(status, |s| s.last_termination = Some(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatTransport;
    use crate::error::Error;
    use crate::store::{MemoryStorage, SubscriberStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullTransport;

    #[async_trait]
    impl ChatTransport for NullTransport {
        async fn resolve(&self, user: &str) -> Result<String> {
            Ok(user.to_string())
        }
        async fn send(&self, _chat_id: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Every open fails; counts attempts
    struct FailingFactory {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl SessionFactory for FailingFactory {
        async fn open(&self) -> Result<WatchSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err(Error::Custom("connection refused".to_string()))
        }
    }

    fn router() -> Arc<EventRouter> {
        let store = Arc::new(SubscriberStore::new(Arc::new(MemoryStorage::new())));
        Arc::new(EventRouter::new(store, Arc::new(NullTransport), Duration::from_secs(1)))
    }

    fn config(max_restarts: Option<u32>) -> WatchConfig {
        WatchConfig {
            restart_delay: Duration::from_secs(15),
            max_restarts,
            ..WatchConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let scheduler = PollerScheduler::new(config(None));
        let factory = Arc::new(FailingFactory { opens: AtomicUsize::new(0) });

        assert_eq!(
            scheduler.start_task("pods", factory.clone(), router()).await,
            StartOutcome::Started
        );
        assert_eq!(
            scheduler.start_task("pods", factory.clone(), router()).await,
            StartOutcome::AlreadyRunning
        );
        assert_eq!(scheduler.state("pods").await, TaskState::Running);

        assert_eq!(scheduler.stop_task("pods").await, StopOutcome::Stopped);
        assert_eq!(scheduler.stop_task("pods").await, StopOutcome::NotRunning);
        assert_eq!(scheduler.state("pods").await, TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_opens_retry_after_quiescence_interval() {
        let scheduler = PollerScheduler::new(config(None));
        let factory = Arc::new(FailingFactory { opens: AtomicUsize::new(0) });
        scheduler.start_task("pods", factory.clone(), router()).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);

        let tasks = scheduler.tasks().await;
        assert_eq!(tasks[0].restarts, 1);
        assert_eq!(tasks[0].last_termination.as_deref(), Some("connection refused"));
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_budget_stops_task() {
        let scheduler = PollerScheduler::new(config(Some(2)));
        let factory = Arc::new(FailingFactory { opens: AtomicUsize::new(0) });
        scheduler.start_task("pods", factory.clone(), router()).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(factory.opens.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.state("pods").await, TaskState::Stopped);

        // a finished task can be started again
        assert_eq!(
            scheduler.start_task("pods", factory, router()).await,
            StartOutcome::Started
        );
        scheduler.stop_all().await;
    }
}
