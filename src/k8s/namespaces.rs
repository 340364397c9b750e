use super::resource_api::{ResourceKind, ResourceSummary};
use super::utils::age_since;
use k8s_openapi::api::core::v1::Namespace as K8sNamespace;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

pub(crate) fn summarize(ns: &K8sNamespace) -> ResourceSummary {
    ResourceSummary {
        kind: ResourceKind::Namespace,
        name: ns
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        namespace: None,
        phase: Some(
            ns.status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        ),
        ip: None,
        age: age_since(ns.metadata.creation_timestamp.as_ref()),
    }
}

/// List all namespaces in the cluster, sorted by name
///
/// # Errors
///
/// Will return `Err` if data cannot be retrieved from k8s cluster API
pub async fn list_namespaces(client: Client) -> Result<Vec<ResourceSummary>, kube::Error> {
    // Namespaces are cluster-scoped, so we use Api::all
    let api: Api<K8sNamespace> = Api::all(client);
    let ns_list = api.list(&ListParams::default()).await?;
    debug!("list_namespaces: fetched {} namespaces", ns_list.items.len());

    let mut namespaces: Vec<ResourceSummary> = ns_list.items.iter().map(summarize).collect();
    namespaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn test_summarize_namespace_without_status() {
        let ns = K8sNamespace {
            metadata: ObjectMeta {
                name: Some("shop".to_string()),
                ..ObjectMeta::default()
            },
            ..K8sNamespace::default()
        };

        let summary = summarize(&ns);
        assert_eq!(summary.kind, ResourceKind::Namespace);
        assert_eq!(summary.name, "shop");
        assert_eq!(summary.phase.as_deref(), Some("Unknown"));
        assert!(summary.namespace.is_none());
    }
}
