use derive_more::From;
use k8s_openapi::serde_json;
use std::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    Kubeconfig(kube::config::KubeconfigError),

    #[from]
    Sqlx(sqlx::Error),

    #[from]
    Io(std::io::Error),

    #[from]
    Delivery(DeliveryFailure),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// Render the error as the single line shown to a chat user.
    ///
    /// Cluster API rejections keep their status code so users can tell a
    /// missing pod from a permission problem.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Kube(kube::Error::Api(resp)) => {
                format!("error {}: {}", resp.code, resp.message)
            }
            Self::Custom(msg) => msg.clone(),
            other => format!("error: {other}"),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Delivery(e) => write!(fmt, "{e}"),
            Self::Custom(msg) => write!(fmt, "{msg}"),
            other => write!(fmt, "{other:?}"),
        }
    }
}

impl std::error::Error for Error {}

/// Why a watch stream stopped yielding events. Every variant is recoverable:
/// the poller reopens the stream after its quiescence interval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamTerminated {
    #[error("watch stream closed by server")]
    Closed,
    #[error("watch stream transport error: {0}")]
    Transport(String),
    #[error("watch stream idle for {0:?}")]
    TimedOut(Duration),
    #[error("watch resource version expired")]
    Expired,
}

/// A single recipient could not be reached. Never affects other recipients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("recipient {0} is unreachable")]
    Unreachable(String),
    #[error("send to {recipient} failed: {reason}")]
    Send { recipient: String, reason: String },
    #[error("send to {0} timed out")]
    TimedOut(String),
}
