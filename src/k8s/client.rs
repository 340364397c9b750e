// Kube config loading with custom user-agent and kube context support
use crate::error::Result as KnResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::config::KubeConfigOptions;
use kube::Config;
use tracing::warn;

/// Add a user-agent header to a kube config. Invalid values are logged and skipped.
pub fn add_user_agent_header(config: &mut Config, user_agent: Option<&str>) {
    if let Some(user_agent) = user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(header_value) => config
                .headers
                .push((HeaderName::from_static("user-agent"), header_value)),
            Err(e) => warn!("ignoring invalid user-agent {:?}: {}", user_agent, e),
        }
    }
}

/// Load the kube config for `context`, or infer the default one
///
/// # Errors
///
/// Will return `Err` if no usable kube configuration can be found
pub async fn load_config(context: Option<&str>) -> KnResult<Config> {
    let config = match context {
        Some(ctx) => {
            let options = KubeConfigOptions {
                context: Some(ctx.to_string()),
                ..KubeConfigOptions::default()
            };
            Config::from_kubeconfig(&options).await?
        }
        None => Config::infer().await?,
    };
    Ok(config)
}
