pub mod client;
pub mod client_manager;
pub mod kube_api;
pub mod namespaces;
pub mod pods;
pub mod resource_api;
pub mod utils;

pub use kube_api::KubeResourceApi;
pub use resource_api::{RawWatchItem, RawWatchStream, ResourceApi, ResourceKind, ResourceSummary, WatchScope};

/// Default user agent for `kubenotify` - automatically uses the package version
///
/// All cluster calls go through `client_manager`, which stamps this value on
/// every client it builds.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
