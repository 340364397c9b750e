/**
 * Configuration constants for watchers, delivery and storage
 */
use std::time::Duration;

/// Quiescence interval between watch restarts, in seconds
pub const DEFAULT_RESTART_DELAY_SECONDS: u64 = 15;

/// Watch stream timeout in seconds (294 vs 300 to allow 6 seconds for graceful shutdown)
pub const WATCH_TIMEOUT_SECONDS: u32 = 294;

/// Pause before resuming a watch the server ended cleanly, in seconds
pub const WATCH_RESUME_DELAY_SECONDS: u64 = 1;

/// Extra time past the server-side timeout before a silent stream is treated as dead
pub const WATCH_IDLE_GRACE_SECONDS: u64 = 30;

/// Upper bound on a single chat send, in seconds
pub const DEFAULT_SEND_TIMEOUT_SECONDS: u64 = 10;

/// Namespace given to users that have never set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default location of the subscriber database
pub const DEFAULT_DB_LOCATION: &str = "kubenotify.db";

/// Poller task name for the pod stream
pub const POD_TASK: &str = "pods";

/// Poller task name for the namespace stream
pub const NAMESPACE_TASK: &str = "namespaces";

/// Runtime settings shared by every poller task and the event router
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Pause between a stream termination and the next open
    pub restart_delay: Duration,
    /// Give up after this many consecutive restarts; `None` never gives up
    pub max_restarts: Option<u32>,
    /// Server-side timeout requested on each watch call
    pub watch_timeout_secs: u32,
    /// Client-side limit on waiting for the next item
    pub idle_timeout: Option<Duration>,
    /// Limit on one chat delivery
    pub send_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(DEFAULT_RESTART_DELAY_SECONDS),
            max_restarts: None,
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
            idle_timeout: Some(Duration::from_secs(
                u64::from(WATCH_TIMEOUT_SECONDS) + WATCH_IDLE_GRACE_SECONDS,
            )),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECONDS),
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_RESTART_DELAY_SECONDS > 0, "DEFAULT_RESTART_DELAY_SECONDS must be greater than 0");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
    assert!(WATCH_RESUME_DELAY_SECONDS > 0, "WATCH_RESUME_DELAY_SECONDS must be greater than 0");
    assert!(DEFAULT_SEND_TIMEOUT_SECONDS > 0, "DEFAULT_SEND_TIMEOUT_SECONDS must be greater than 0");
};
