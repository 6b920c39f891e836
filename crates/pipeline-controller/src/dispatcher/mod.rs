//! C6 `WebhookDispatcher`: the axum HTTP surface that turns GitHub webhooks
//! into replication runs, abort requests, and PR resource updates.
//!
//! Mirrors `whd/dispatcher.py` and `whd/webhook.py`: verify the signature,
//! classify the event by the `X-GitHub-Event` header, hand it to a detached
//! task, and acknowledge with `200 OK` immediately. Handler errors are
//! logged inside the task and never reach the HTTP layer — the sender
//! retries on non-2xx, and GitHub has no use for our internal failures.

pub mod abort;
pub mod labels;
pub mod pr;
pub mod resources;
pub mod signature;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use pipeline_ci_backend::CiBackendClient;
use pipeline_config::{CreateEvent, JobMapping, PullRequestAction, PullRequestEvent, PushEvent, RefType, RenderOrigin};
use pipeline_scm::GithubClient;
use tracing::{info, warn};

use crate::dispatcher::pr::PrEventContext;
use crate::dispatcher::resources::{matching_git_resources, matching_pull_request_resources};
use crate::orchestrator::ReplicationOrchestrator;
use crate::renderer::PipelineRenderer;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const ENTERPRISE_HOST_HEADER: &str = "x-github-enterprise-host";
const DEFAULT_HOST: &str = "github.com";

pub struct WebhookDispatcher {
    github: Arc<dyn GithubClient>,
    ci_clients: Vec<Arc<dyn CiBackendClient>>,
    renderer: Arc<dyn PipelineRenderer>,
    orchestrator: Arc<ReplicationOrchestrator>,
    job_mappings: HashMap<String, JobMapping>,
    webhook_secret: Option<String>,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(
        github: Arc<dyn GithubClient>,
        ci_clients: Vec<Arc<dyn CiBackendClient>>,
        renderer: Arc<dyn PipelineRenderer>,
        orchestrator: Arc<ReplicationOrchestrator>,
        job_mappings: Vec<JobMapping>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            github,
            ci_clients,
            renderer,
            orchestrator,
            job_mappings: job_mappings.into_iter().map(|m| (m.name.clone(), m)).collect(),
            webhook_secret,
        }
    }

    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/", post(handle_webhook)).with_state(self)
    }

    fn mapping_for_repo_path(&self, repo_path: &str) -> Option<JobMapping> {
        self.job_mappings.get(repo_path).cloned()
    }

    fn pr_context(&self, mapping: JobMapping) -> PrEventContext {
        PrEventContext {
            github: Arc::clone(&self.github),
            ci_clients: self.ci_clients.clone(),
            renderer: Arc::clone(&self.renderer),
            mapping,
        }
    }
}

async fn handle_webhook(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &dispatcher.webhook_secret {
        let Some(header_value) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("webhook request missing {SIGNATURE_HEADER} header");
            return StatusCode::UNAUTHORIZED;
        };
        if !signature::verify_signature(&body, header_value, secret) {
            warn!("webhook signature verification failed");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let Some(event_kind) = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string) else {
        warn!("webhook request missing {EVENT_HEADER} header");
        return StatusCode::BAD_REQUEST;
    };

    let enterprise_host = headers
        .get(ENTERPRISE_HOST_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_HOST)
        .to_string();

    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    match event_kind.as_str() {
        "push" => match serde_json::from_slice::<PushEvent>(&body) {
            Ok(event) => {
                tokio::spawn(async move {
                    handle_push(&dispatcher, event).await;
                });
            }
            Err(e) => {
                warn!(delivery = %delivery_id, error = %e, "failed to parse push event body");
                return StatusCode::BAD_REQUEST;
            }
        },
        "create" => match serde_json::from_slice::<CreateEvent>(&body) {
            Ok(event) => {
                tokio::spawn(async move {
                    handle_create(&dispatcher, event).await;
                });
            }
            Err(e) => {
                warn!(delivery = %delivery_id, error = %e, "failed to parse create event body");
                return StatusCode::BAD_REQUEST;
            }
        },
        "pull_request" => match serde_json::from_slice::<PullRequestEvent>(&body) {
            Ok(event) => {
                tokio::spawn(async move {
                    handle_pull_request(&dispatcher, event, &enterprise_host).await;
                });
            }
            Err(e) => {
                warn!(delivery = %delivery_id, error = %e, "failed to parse pull_request event body");
                return StatusCode::BAD_REQUEST;
            }
        },
        other => {
            info!(delivery = %delivery_id, event = other, "ignoring unrecognized webhook event kind");
        }
    }

    StatusCode::OK
}

async fn handle_push(dispatcher: &WebhookDispatcher, event: PushEvent) {
    if event.skip_ci_requested() {
        info!(repo = %event.repository.repo_path(), "push carries [skip ci], ignoring");
        return;
    }

    let repo_path = event.repository.repo_path();
    let mapping = dispatcher.mapping_for_repo_path(&repo_path);

    if event.modified_pipeline_definitions() {
        if let Some(mapping) = &mapping {
            info!(repo = %repo_path, "pipeline definitions changed, re-replicating");
            let results = dispatcher
                .orchestrator
                .replicate_repository(&mapping.name, RenderOrigin::WebhookDispatch)
                .await;
            if results.has_failures() {
                warn!(repo = %repo_path, "webhook-triggered replication had render or deploy failures");
            }
        } else {
            warn!(repo = %repo_path, "pipeline definitions changed but no job mapping is configured for this repository");
        }
    }

    let matched = matching_git_resources(
        &dispatcher.ci_clients,
        &event.repository.host,
        &repo_path,
        event.skip_ci_requested(),
    )
    .await;

    for m in &matched {
        if let Some(mapping) = &mapping {
            let aborted = abort::abort_obsolete_jobs(
                m.client.as_ref(),
                mapping,
                &m.resource.pipeline_name,
                event.previous_ref(),
                event.forced,
            )
            .await;
            if aborted > 0 {
                info!(pipeline = %m.resource.pipeline_name, aborted, "aborted obsolete builds for push");
            }
        }
        if let Err(e) = m.client.trigger_resource_check(&m.resource.pipeline_name, &m.resource.name).await {
            warn!(pipeline = %m.resource.pipeline_name, resource = %m.resource.name, error = %e, "failed to trigger resource check for push");
        }
    }
}

async fn handle_create(dispatcher: &WebhookDispatcher, event: CreateEvent) {
    if event.ref_type != RefType::Branch {
        return;
    }
    let repo_path = event.repository.repo_path();
    let Some(mapping) = dispatcher.mapping_for_repo_path(&repo_path) else {
        info!(repo = %repo_path, "branch created but no job mapping is configured for this repository");
        return;
    };
    info!(repo = %repo_path, branch = %event.ref_, "new branch created, replicating pipeline definitions");
    let results = dispatcher
        .orchestrator
        .replicate_repository(&mapping.name, RenderOrigin::WebhookDispatch)
        .await;
    if results.has_failures() {
        warn!(repo = %repo_path, "branch-creation replication had render or deploy failures");
    }
}

async fn handle_pull_request(dispatcher: &WebhookDispatcher, event: PullRequestEvent, _enterprise_host: &str) {
    if !event.is_actionable() {
        return;
    }

    let repo_path = event.repository.repo_path();
    let Some(mapping) = dispatcher.mapping_for_repo_path(&repo_path) else {
        info!(repo = %repo_path, "pull_request event but no job mapping is configured for this repository");
        return;
    };
    let ctx = dispatcher.pr_context(mapping);

    if event.modified_pipeline_definitions()
        && matches!(event.action, PullRequestAction::Opened | PullRequestAction::Synchronize)
    {
        pr::validate_pipeline_definitions_for_pr(&ctx, &event).await;
    }

    let matched = matching_pull_request_resources(&dispatcher.ci_clients, &event.repository.host, &repo_path).await;
    for m in &matched {
        pr::process_resource(&ctx, &event, m).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_config::{CiTargetKey, RepositoryRef};

    fn mapping() -> JobMapping {
        JobMapping {
            name: "org/repo".into(),
            ci_target: CiTargetKey {
                backend_name: "main".into(),
                team_name: "team-a".into(),
            },
            trusted_teams: vec![],
            deny_on_empty_trusted_teams: false,
            cleanup_policy: Default::default(),
            abort_config: Default::default(),
        }
    }

    #[test]
    fn repo_path_formats_as_org_slash_name() {
        let repo = RepositoryRef {
            host: "github.example".into(),
            org: "org".into(),
            name: "repo".into(),
        };
        assert_eq!(repo.repo_path(), "org/repo");
        assert_eq!(mapping().name, repo.repo_path());
    }
}
