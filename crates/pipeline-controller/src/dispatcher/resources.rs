//! Matches a webhook event's repository against the git/pull-request
//! resources configured on every pipeline known to every CI backend client,
//! mirroring `whd/dispatcher.py::_matching_resources`.

use std::sync::Arc;

use pipeline_ci_backend::{CiBackendClient, PipelineConfigResource, ResourceType};
use tracing::warn;

/// A resource found on some pipeline, paired with the client that serves it.
pub struct MatchedResource {
    pub client: Arc<dyn CiBackendClient>,
    pub resource: PipelineConfigResource,
}

/// Finds every git resource across `clients` whose `source` points at
/// `hostname`/`repo_path`. When `skip_ci` is set (the push's commit message
/// carried `[skip ci]`/`[ci skip]`), a resource is excluded unless its
/// source explicitly opted out via `disable_ci_skip`.
pub async fn matching_git_resources(
    clients: &[Arc<dyn CiBackendClient>],
    hostname: &str,
    repo_path: &str,
    skip_ci: bool,
) -> Vec<MatchedResource> {
    matching_resources(clients, hostname, repo_path, ResourceType::Git)
        .await
        .into_iter()
        .filter(|m| !skip_ci || m.resource.source.disable_ci_skip)
        .collect()
}

/// Finds every pull-request resource across `clients` whose `source` points
/// at `hostname`/`repo_path`.
pub async fn matching_pull_request_resources(
    clients: &[Arc<dyn CiBackendClient>],
    hostname: &str,
    repo_path: &str,
) -> Vec<MatchedResource> {
    matching_resources(clients, hostname, repo_path, ResourceType::PullRequest).await
}

async fn matching_resources(
    clients: &[Arc<dyn CiBackendClient>],
    hostname: &str,
    repo_path: &str,
    resource_type: ResourceType,
) -> Vec<MatchedResource> {
    let mut matched = Vec::new();
    for client in clients {
        let pipeline_names = match client.pipelines().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list pipelines while matching resources");
                continue;
            }
        };
        let resources = match client.pipeline_resources(&pipeline_names, Some(resource_type)).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "failed to list pipeline resources while matching resources");
                continue;
            }
        };
        for resource in resources {
            if resource.source.hostname == hostname && resource.source.repo_path_trimmed() == repo_path {
                matched.push(MatchedResource {
                    client: Arc::clone(client),
                    resource,
                });
            }
        }
    }
    matched
}
