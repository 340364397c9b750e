use super::{USER_AGENT, client::add_user_agent_header, client::load_config};
use crate::error::Result as KnResult;
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Kubernetes client cache keyed by kube context. Handles lazy creation,
/// reuse across commands and watchers, and refresh after auth failures.
pub struct K8sClientManager {
    clients: RwLock<Option<HashMap<String, Arc<Client>>>>,
}

impl K8sClientManager {
    const fn new() -> Self {
        Self {
            clients: RwLock::const_new(None),
        }
    }

    fn key(context: Option<&str>) -> String {
        context.unwrap_or_default().to_string()
    }

    /// Get or create the client for `context`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration for the context cannot be
    /// loaded or the client cannot be built
    pub async fn get_client(&self, context: Option<&str>) -> KnResult<Arc<Client>> {
        let key = Self::key(context);
        {
            let guard = self.clients.read().await;
            if let Some(client) = guard.as_ref().and_then(|m| m.get(&key)) {
                debug!("♻️ Reusing existing Kubernetes client for context '{}'", key);
                return Ok(client.clone());
            }
        }

        debug!("🔧 Creating new Kubernetes client for context '{}'", key);
        self.create_client(context).await
    }

    /// Drop the cached client for `context` and build a fresh one
    ///
    /// # Errors
    ///
    /// Returns an error if client creation fails
    pub async fn refresh_client(&self, context: Option<&str>) -> KnResult<Arc<Client>> {
        debug!("🔄 Force refreshing Kubernetes client due to auth error");
        {
            let mut guard = self.clients.write().await;
            if let Some(map) = guard.as_mut() {
                map.remove(&Self::key(context));
            }
        }
        self.create_client(context).await
    }

    async fn create_client(&self, context: Option<&str>) -> KnResult<Arc<Client>> {
        let mut config = load_config(context).await.map_err(|e| {
            error!("❌ Failed to load Kubernetes configuration: {}", e);
            e
        })?;
        add_user_agent_header(&mut config, Some(USER_AGENT));

        let client = Client::try_from(config).map_err(|e| {
            error!("❌ Failed to create Kubernetes client: {}", e);
            e
        })?;
        let client = Arc::new(client);

        self.clients
            .write()
            .await
            .get_or_insert_with(HashMap::new)
            .insert(Self::key(context), client.clone());

        debug!("✅ Successfully created new Kubernetes client");
        Ok(client)
    }
}

/// Global client cache shared by commands and watchers
static CLIENT_MANAGER: K8sClientManager = K8sClientManager::new();

/// Get the client for `context` (or the current context)
///
/// # Errors
///
/// Returns an error if the client cannot be created
pub async fn get_client(context: Option<&str>) -> KnResult<Arc<Client>> {
    CLIENT_MANAGER.get_client(context).await
}

/// Rebuild the client for `context` after an authentication failure
///
/// # Errors
///
/// Returns an error if the client cannot be refreshed
pub async fn refresh_client(context: Option<&str>) -> KnResult<Arc<Client>> {
    CLIENT_MANAGER.refresh_client(context).await
}

/// Returns true if the error looks like expired or revoked credentials
pub const fn should_refresh_client(error: &kube::Error) -> bool {
    match error {
        kube::Error::Api(api_error) => matches!(api_error.code, 401 | 403),
        kube::Error::Auth(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_should_refresh_client() {
        assert!(should_refresh_client(&api_error(401, "Unauthorized")));
        assert!(should_refresh_client(&api_error(403, "Forbidden")));
        assert!(!should_refresh_client(&api_error(404, "NotFound")));
    }

    #[test]
    fn test_context_key() {
        assert_eq!(K8sClientManager::key(None), "");
        assert_eq!(K8sClientManager::key(Some("prod")), "prod");
    }
}
