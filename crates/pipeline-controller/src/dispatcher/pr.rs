//! `process_pr_event`: the pull_request webhook handler's orchestration —
//! pipeline-definition validation, required-label management, and the
//! resource-update settle loop.

use std::sync::Arc;
use std::time::Duration;

use pipeline_ci_backend::CiBackendClient;
use pipeline_config::{JobMapping, PullRequestAction, PullRequestEvent};
use pipeline_scm::{GithubClient, RepoSlug};
use tracing::{info, warn};

use crate::dispatcher::labels::should_label;
use crate::dispatcher::resources::MatchedResource;
use crate::enumerator::GithubDefinitionEnumerator;
use crate::renderer::PipelineRenderer;

/// Applied to a PR whose `.ci/pipeline_definitions` fails to render; removed
/// and replaced by a "fixed" comment once a later push renders cleanly.
pub const BROKEN_PIPELINE_DEFINITION_LABEL: &str = "ci/broken-pipeline-definition";

const PRIVILEGED_ACK_LABELS: [&str; 2] = ["lgtm", "reviewed/lgtm"];

const RESOURCE_UPDATE_MAX_RETRIES: u32 = 10;
const RESOURCE_UPDATE_INITIAL_SLEEP_SECS: f64 = 3.0;
const RESOURCE_UPDATE_BACKOFF_FACTOR: f64 = 1.2;

/// Collaborators a single pull_request dispatch needs; built once per
/// inbound event by the dispatcher and threaded through every helper below.
pub struct PrEventContext {
    pub github: Arc<dyn GithubClient>,
    pub ci_clients: Vec<Arc<dyn CiBackendClient>>,
    pub renderer: Arc<dyn PipelineRenderer>,
    pub mapping: JobMapping,
}

/// Validates `.ci/pipeline_definitions` at the PR's head branch, commenting
/// and labeling the PR on failure or on recovery from a prior failure.
pub async fn validate_pipeline_definitions_for_pr(ctx: &PrEventContext, event: &PullRequestEvent) {
    let enumerator = GithubDefinitionEnumerator::new(
        Arc::clone(&ctx.github),
        vec![ctx.mapping.clone()],
        event.head_ref.clone(),
        event.head_repo.host.clone(),
    );
    let descriptors = enumerator.enumerate().await;

    let mut first_error = None;
    for descriptor in &descriptors {
        if let Some(error) = &descriptor.enumeration_error {
            first_error = Some(error.clone());
            break;
        }
        let result = ctx
            .renderer
            .render(descriptor, pipeline_config::RenderOrigin::WebhookDispatch)
            .await;
        if let pipeline_config::RenderResult::Failure { class, error, .. } = result {
            if class == pipeline_config::RenderFailureClass::UserError {
                first_error = Some(error);
                break;
            }
        }
    }

    let issue_repo = RepoSlug::new(event.repository.org.clone(), event.repository.name.clone());
    let pr_has_broken_label = event
        .label_names
        .iter()
        .any(|l| l == BROKEN_PIPELINE_DEFINITION_LABEL);

    match first_error {
        Some(error) => {
            let body = format!("Validating `.ci/pipeline_definitions` failed:\n\n```\n{error}\n```");
            if let Err(e) = ctx.github.add_issue_comment(&issue_repo, event.number, &body).await {
                warn!(pr = event.number, error = %e, "failed to comment on PR with validation failure");
            }
            if !pr_has_broken_label {
                if let Err(e) = ctx
                    .github
                    .add_labels(&issue_repo, event.number, &[BROKEN_PIPELINE_DEFINITION_LABEL.to_string()])
                    .await
                {
                    warn!(pr = event.number, error = %e, "failed to apply broken-pipeline-definition label");
                }
            }
        }
        None if pr_has_broken_label => {
            if let Err(e) = ctx
                .github
                .remove_label(&issue_repo, event.number, BROKEN_PIPELINE_DEFINITION_LABEL)
                .await
            {
                warn!(pr = event.number, error = %e, "failed to remove broken-pipeline-definition label");
            }
            let body = "`.ci/pipeline_definitions` now renders successfully.".to_string();
            if let Err(e) = ctx.github.add_issue_comment(&issue_repo, event.number, &body).await {
                warn!(pr = event.number, error = %e, "failed to post pipeline-definitions-fixed comment");
            }
        }
        None => {}
    }
}

/// Processes one matched pull-request resource batch: label management,
/// resource-check trigger, and the settle loop. Mirrors the per-resource body
/// of `whd/dispatcher.py::dispatch_pullrequest_event`.
pub async fn process_resource(ctx: &PrEventContext, event: &PullRequestEvent, matched: &MatchedResource) {
    let required_label = matched.resource.source.label.clone();
    let repo_org = event.repository.org.clone();
    let issue_repo = RepoSlug::new(repo_org.clone(), event.repository.name.clone());

    if event.action == PullRequestAction::Labeled {
        let Some(label) = &event.label else { return };
        if PRIVILEGED_ACK_LABELS.contains(&label.as_str()) {
            if let Some(required) = &required_label {
                if !event.label_names.iter().any(|l| l == required) {
                    apply_label(ctx.github.as_ref(), &issue_repo, event.number, required).await;
                }
            }
        }
        // A label not required by this job's resource is a no-op for this batch.
    } else if matches!(event.action, PullRequestAction::Opened | PullRequestAction::Synchronize) {
        let trusted = should_label(
            ctx.github.as_ref(),
            &ctx.mapping,
            &event.repository.host,
            &repo_org,
            &event.sender_login,
        )
        .await;
        if let Some(required) = &required_label {
            if trusted {
                if !event.label_names.iter().any(|l| l == required) {
                    apply_label(ctx.github.as_ref(), &issue_repo, event.number, required).await;
                }
            } else if event.action == PullRequestAction::Opened {
                let body = format!(
                    "@{} is not a trusted sender; a maintainer must apply the `{required}` label to run CI for this PR.",
                    event.sender_login
                );
                if let Err(e) = ctx.github.add_issue_comment(&issue_repo, event.number, &body).await {
                    warn!(pr = event.number, error = %e, "failed to post untrusted-sender comment");
                }
            }
        }
    }

    if let Err(e) = matched
        .client
        .trigger_resource_check(&matched.resource.pipeline_name, &matched.resource.name)
        .await
    {
        warn!(pipeline = %matched.resource.pipeline_name, resource = %matched.resource.name, error = %e, "failed to trigger PR resource check");
    }

    ensure_pr_resource_updates(matched, event.number, required_label.as_deref(), &event.label_names).await;
}

async fn apply_label(github: &dyn GithubClient, repo: &RepoSlug, number: u64, label: &str) {
    if let Err(e) = github.add_labels(repo, number, &[label.to_string()]).await {
        warn!(pr = number, label, error = %e, "failed to apply required label");
    }
}

/// Polls until the PR resource has registered this PR's head commit as a
/// version, or the PR doesn't require a label its sender doesn't have, or
/// retries are exhausted (property P10).
pub async fn ensure_pr_resource_updates(
    matched: &MatchedResource,
    pr_number: u64,
    required_label: Option<&str>,
    current_labels: &[String],
) {
    if let Some(required) = required_label {
        if !current_labels.iter().any(|l| l == required) {
            return;
        }
    }

    let mut sleep_secs = RESOURCE_UPDATE_INITIAL_SLEEP_SECS;
    for attempt in 0..RESOURCE_UPDATE_MAX_RETRIES {
        let up_to_date = match matched
            .client
            .resource_versions(&matched.resource.pipeline_name, &matched.resource.name)
            .await
        {
            Ok(versions) => versions.iter().any(|v| v.pr == pr_number.to_string()),
            Err(e) => {
                warn!(pipeline = %matched.resource.pipeline_name, resource = %matched.resource.name, error = %e, "failed to read resource versions");
                false
            }
        };

        if up_to_date {
            info!(pr = pr_number, attempt, "PR resource is up to date");
            return;
        }

        if let Err(e) = matched
            .client
            .trigger_resource_check(&matched.resource.pipeline_name, &matched.resource.name)
            .await
        {
            warn!(pipeline = %matched.resource.pipeline_name, error = %e, "failed to trigger resource check during settle loop");
        }

        if attempt + 1 < RESOURCE_UPDATE_MAX_RETRIES {
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
            sleep_secs *= RESOURCE_UPDATE_BACKOFF_FACTOR;
        }
    }
    warn!(pr = pr_number, "PR resource did not settle within retry budget");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipeline_definition_label_is_stable() {
        assert_eq!(BROKEN_PIPELINE_DEFINITION_LABEL, "ci/broken-pipeline-definition");
    }
}
