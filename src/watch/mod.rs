pub mod event;
pub mod router;
pub mod scheduler;
pub mod session;

pub use event::{EventType, WatchEvent, format_message};
pub use router::{EventRouter, RouteReport, RouterStats};
pub use scheduler::{
    PollerScheduler, PollerTask, SessionFactory, StartOutcome, StopOutcome, TaskState, WatchTarget,
};
pub use session::WatchSession;
