//! Yields [`DefinitionDescriptor`]s from `.ci/pipeline_definitions` files in
//! configured repositories, one enumerator per mapped repository.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_config::{DefinitionDescriptor, JobMapping, MainRepository, PIPELINE_DEFINITIONS_PATH};
use pipeline_scm::{GithubClient, RepoSlug};
use serde::Deserialize;
use tracing::warn;

#[async_trait]
pub trait DefinitionEnumerator: Send + Sync {
    async fn enumerate(&self) -> Vec<DefinitionDescriptor>;
}

/// One entry of a `.ci/pipeline_definitions` document: a named pipeline
/// variant plus its base definition and ordered overrides.
#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    definition: serde_json::Value,
    #[serde(default)]
    override_definitions: Vec<serde_json::Value>,
    #[serde(default)]
    secret_cfg_name: Option<String>,
}

type RawPipelineDefinitions = std::collections::BTreeMap<String, RawDefinition>;

/// Enumerates definitions for every [`JobMapping`] by reading its repository's
/// `.ci/pipeline_definitions` via the GitHub API at HEAD of the mapping's
/// configured branch.
pub struct GithubDefinitionEnumerator {
    github: Arc<dyn GithubClient>,
    job_mappings: Vec<JobMapping>,
    branch: String,
    hostname: String,
}

impl GithubDefinitionEnumerator {
    #[must_use]
    pub fn new(
        github: Arc<dyn GithubClient>,
        job_mappings: Vec<JobMapping>,
        branch: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            github,
            job_mappings,
            branch: branch.into(),
            hostname: hostname.into(),
        }
    }

    fn repo_slug(mapping: &JobMapping) -> Option<RepoSlug> {
        let (owner, name) = mapping.name.split_once('/')?;
        Some(RepoSlug::new(owner, name))
    }

    async fn enumerate_mapping(&self, mapping: &JobMapping) -> Vec<DefinitionDescriptor> {
        let Some(slug) = Self::repo_slug(mapping) else {
            return vec![enumeration_error_descriptor(
                mapping,
                &self.branch,
                &self.hostname,
                format!("job mapping name {:?} is not of the form owner/repo", mapping.name),
            )];
        };

        let fetched = self
            .github
            .file_contents(&slug, PIPELINE_DEFINITIONS_PATH, Some(&self.branch))
            .await;

        let contents = match fetched {
            Ok(Some(c)) => c,
            Ok(None) => {
                return vec![enumeration_error_descriptor(
                    mapping,
                    &self.branch,
                    &self.hostname,
                    format!("{PIPELINE_DEFINITIONS_PATH} not found in {slug}"),
                )]
            }
            Err(e) => {
                warn!(repo = %slug, error = %e, "failed to fetch pipeline definitions");
                return vec![enumeration_error_descriptor(
                    mapping,
                    &self.branch,
                    &self.hostname,
                    format!("failed to fetch {PIPELINE_DEFINITIONS_PATH}: {e}"),
                )];
            }
        };

        let raw: RawPipelineDefinitions = match serde_yaml::from_str(&contents.content) {
            Ok(raw) => raw,
            Err(e) => {
                return vec![enumeration_error_descriptor(
                    mapping,
                    &self.branch,
                    &self.hostname,
                    format!("{PIPELINE_DEFINITIONS_PATH} is not valid: {e}"),
                )]
            }
        };

        let main_repo = MainRepository {
            owner: slug.owner.clone(),
            name: slug.name.clone(),
            branch: self.branch.clone(),
            hostname: self.hostname.clone(),
        };

        raw.into_iter()
            .map(|(pipeline_name, def)| DefinitionDescriptor {
                effective_pipeline_name: pipeline_name.clone(),
                pipeline_name,
                main_repo: main_repo.clone(),
                base_definition: def.definition,
                override_definitions: def.override_definitions,
                ci_target: mapping.ci_target.clone(),
                job_mapping_name: mapping.name.clone(),
                secret_cfg_name: def.secret_cfg_name,
                committish: contents.sha.clone(),
                enumeration_error: None,
            })
            .collect()
    }
}

#[async_trait]
impl DefinitionEnumerator for GithubDefinitionEnumerator {
    async fn enumerate(&self) -> Vec<DefinitionDescriptor> {
        let mut out = Vec::new();
        for mapping in &self.job_mappings {
            out.extend(self.enumerate_mapping(mapping).await);
        }
        out
    }
}

fn enumeration_error_descriptor(
    mapping: &JobMapping,
    branch: &str,
    hostname: &str,
    error: String,
) -> DefinitionDescriptor {
    let (owner, name) = mapping.name.split_once('/').unwrap_or(("", ""));
    DefinitionDescriptor {
        pipeline_name: mapping.name.clone(),
        effective_pipeline_name: mapping.name.clone(),
        main_repo: MainRepository {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
            hostname: hostname.to_string(),
        },
        base_definition: serde_json::Value::Null,
        override_definitions: vec![],
        ci_target: mapping.ci_target.clone(),
        job_mapping_name: mapping.name.clone(),
        secret_cfg_name: None,
        committish: String::new(),
        enumeration_error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use pipeline_config::CiTargetKey;
    use pipeline_scm::{FileContents, Issue, IssueEdit, PullRequest, Release, ScmError};

    mock! {
        Github {}

        #[async_trait]
        impl GithubClient for Github {
            async fn repository(&self, repo: &RepoSlug) -> Result<pipeline_scm::Repository, ScmError>;
            async fn issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError>;
            async fn create_issue(&self, repo: &RepoSlug, edit: &IssueEdit) -> Result<Issue, ScmError>;
            async fn update_issue(&self, repo: &RepoSlug, number: u64, edit: &IssueEdit) -> Result<Issue, ScmError>;
            async fn close_issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError>;
            async fn add_issue_comment(&self, repo: &RepoSlug, number: u64, body: &str) -> Result<(), ScmError>;
            async fn pull_request(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ScmError>;
            async fn add_labels(&self, repo: &RepoSlug, number: u64, labels: &[String]) -> Result<(), ScmError>;
            async fn remove_label(&self, repo: &RepoSlug, number: u64, label: &str) -> Result<(), ScmError>;
            async fn is_org_member(&self, org: &str, username: &str) -> Result<bool, ScmError>;
            async fn is_team_member(&self, org: &str, team_slug: &str, username: &str) -> Result<bool, ScmError>;
            async fn team_members(&self, org: &str, team_slug: &str) -> Result<Vec<String>, ScmError>;
            async fn file_contents(&self, repo: &RepoSlug, path: &str, git_ref: Option<&str>) -> Result<Option<FileContents>, ScmError>;
            async fn create_or_update_file(&self, repo: &RepoSlug, path: &str, content: &str, commit_message: &str, branch: &str) -> Result<Option<String>, ScmError>;
            async fn branches(&self, repo: &RepoSlug) -> Result<Vec<String>, ScmError>;
            async fn create_tag(&self, repo: &RepoSlug, tag_name: &str, target_sha: &str, message: &str) -> Result<(), ScmError>;
            async fn create_release(&self, repo: &RepoSlug, tag_name: &str, body: &str, draft: bool, prerelease: bool) -> Result<(), ScmError>;
            async fn releases(&self, repo: &RepoSlug) -> Result<Vec<Release>, ScmError>;
            async fn user_email(&self, username: &str) -> Result<Option<String>, ScmError>;
            async fn commit_author_committer_emails(&self, repo: &RepoSlug, sha: &str) -> Result<(Option<String>, Option<String>), ScmError>;
        }
    }

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

    #[tokio::test]
    async fn parses_every_entry_of_the_definitions_file() {
        let mut mock = MockGithub::new();
        mock.expect_file_contents().returning(|_, _, _| {
            Ok(Some(FileContents {
                content: "default:\n  definition:\n    steps: [build]\npull-request:\n  definition:\n    steps: [test]\n".into(),
                sha: "deadbeef".into(),
            }))
        });
        let enumerator =
            GithubDefinitionEnumerator::new(Arc::new(mock), vec![mapping()], "main", "github.example");
        let mut descriptors = enumerator.enumerate().await;
        descriptors.sort_by(|a, b| a.pipeline_name.cmp(&b.pipeline_name));
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].pipeline_name, "default");
        assert!(descriptors.iter().all(|d| d.enumeration_error.is_none()));
    }

    #[tokio::test]
    async fn missing_definitions_file_yields_enumeration_error() {
        let mut mock = MockGithub::new();
        mock.expect_file_contents().returning(|_, _, _| Ok(None));
        let enumerator =
            GithubDefinitionEnumerator::new(Arc::new(mock), vec![mapping()], "main", "github.example");
        let descriptors = enumerator.enumerate().await;
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].enumeration_error.is_some());
    }

    #[tokio::test]
    async fn malformed_mapping_name_yields_enumeration_error_without_calling_github() {
        let mut mock = MockGithub::new();
        mock.expect_file_contents().times(0);
        let mut bad_mapping = mapping();
        bad_mapping.name = "not-a-slug".into();
        let enumerator =
            GithubDefinitionEnumerator::new(Arc::new(mock), vec![bad_mapping], "main", "github.example");
        let descriptors = enumerator.enumerate().await;
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].enumeration_error.is_some());
    }
}
