use super::resource_api::{ResourceKind, ResourceSummary};
use super::utils::age_since;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, ObjectList};
use kube::{Api, Client};

pub(crate) fn summarize(pod: &Pod) -> ResourceSummary {
    let status = pod.status.as_ref();
    ResourceSummary {
        kind: ResourceKind::Pod,
        name: pod
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        namespace: pod.metadata.namespace.clone(),
        phase: status.and_then(|s| s.phase.clone()),
        ip: status.and_then(|s| s.pod_ip.clone()),
        age: age_since(pod.metadata.creation_timestamp.as_ref()),
    }
}

/// List pods in `namespace`, or in every namespace when `None`
///
/// # Errors
///
/// Will return `Err` if data can not be retrieved from k8s cluster api
pub async fn list_pods(client: Client, namespace: Option<&str>) -> Result<Vec<ResourceSummary>, kube::Error> {
    let api: Api<Pod> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let pod_list: ObjectList<Pod> = api.list(&ListParams::default()).await?;

    let mut pods: Vec<ResourceSummary> = pod_list.items.iter().map(summarize).collect();
    pods.sort_by(|a, b| a.namespace.cmp(&b.namespace).then_with(|| a.name.cmp(&b.name)));
    Ok(pods)
}
