//! Wire-adjacent types for the CI-backend REST surface, generalized from
//! `concourse.client.model`.

use serde::{Deserialize, Serialize};

/// Whether `set_pipeline` created a new pipeline or updated an existing one
/// (`concourse.client.model.SetPipelineResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPipelineResult {
    Created,
    Updated,
}

/// The resource types the dispatcher cares about when scanning a pipeline's
/// configured resources: git (push events) and pull-request (PR events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Git,
    PullRequest,
    #[serde(other)]
    Other,
}

/// The `source:` block of a git or pull-request resource, the subset the
/// dispatcher reads to match a resource against an inbound webhook event and
/// to discover label requirements (`resource.source.get('label')`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubSource {
    pub hostname: String,
    pub repo_path: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub disable_ci_skip: bool,
}

impl GithubSource {
    #[must_use]
    pub fn repo_path_trimmed(&self) -> &str {
        self.repo_path.trim_start_matches('/')
    }
}

/// One resource configured on a pipeline, as returned by
/// `pipeline_resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigResource {
    pub name: String,
    pub pipeline_name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub source: GithubSource,
    #[serde(default)]
    pub failing_to_check: bool,
}

/// One version entry on a pull-request resource's version history, as
/// returned by `resource_versions`. Concourse's PR resource stamps the PR
/// number into `version.pr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub pr: String,
}

/// A job declared on a pipeline, as parsed from `pipeline_cfg`. Carries an
/// optional per-job override of the job-mapping's `abort_config.policy`,
/// since `abort_running_jobs_if_configured` derives the effective policy
/// from "its effective definition", which is job-scoped, not mapping-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub abort_obsolete_jobs: Option<pipeline_config::AbortObsoleteJobs>,
}

/// The subset of a pipeline's configuration the abort-obsolete-builds flow
/// needs: its resources (to find git/PR resources) and job names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub resources: Vec<PipelineConfigResource>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_path_trimmed_strips_leading_slash() {
        let source = GithubSource {
            hostname: "github.example".into(),
            repo_path: "/org/repo".into(),
            ..Default::default()
        };
        assert_eq!(source.repo_path_trimmed(), "org/repo");
    }
}
