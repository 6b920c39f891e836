//! Pipeline definitions, job mappings, and the render/deploy result types
//! that flow through the replication orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The repository a [`DefinitionDescriptor`] was enumerated from: owner,
/// name, branch, and hostname, exactly as the renderer's "every variant must
/// declare a main repository" rule requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainRepository {
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub hostname: String,
}

impl MainRepository {
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A pipeline-to-be, built by the enumerator from a `.ci/pipeline_definitions`
/// entry. Immutable once constructed; the preprocessor only ever produces a
/// new value via [`DefinitionDescriptor::with_effective_name`] or similar
/// replacement, never in-place mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionDescriptor {
    pub pipeline_name: String,
    /// The pipeline name after the preprocessor's normalisation pass
    /// (lower-casing, de-duplication suffixing, …). Starts out equal to
    /// `pipeline_name` until preprocessing runs.
    pub effective_pipeline_name: String,
    pub main_repo: MainRepository,
    #[serde(default)]
    pub base_definition: serde_json::Value,
    /// Override definitions, applied in order, later entries winning on
    /// conflicting keys.
    #[serde(default)]
    pub override_definitions: Vec<serde_json::Value>,
    pub ci_target: CiTargetKey,
    /// Name of the job mapping that produced this descriptor, used to look up
    /// trust policy and cleanup policy at deploy/webhook time.
    pub job_mapping_name: String,
    /// Opaque handle to the secret-config to inject into the rendered
    /// template; resolved by the secret store the renderer is wired to.
    #[serde(default)]
    pub secret_cfg_name: Option<String>,
    pub committish: String,
    /// Set by the enumerator when the definition itself could not be
    /// resolved (e.g. the repository or template is missing); a descriptor
    /// carrying this short-circuits straight to a SKIPPED result without
    /// ever reaching the renderer.
    #[serde(default)]
    pub enumeration_error: Option<String>,
}

impl DefinitionDescriptor {
    /// Replaces the effective name, matching the preprocessor's
    /// replace-don't-mutate contract.
    #[must_use]
    pub fn with_effective_name(mut self, name: impl Into<String>) -> Self {
        self.effective_pipeline_name = name.into();
        self
    }
}

/// Identifies which configured CI backend (and team/subteam within it) a
/// definition should be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CiTargetKey {
    pub backend_name: String,
    pub team_name: String,
}

/// A fully rendered pipeline, ready to hand to a CI backend deployer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub ci_target: CiTargetKey,
    pub rendered: serde_json::Value,
}

/// Why a render attempt failed, used to decide whether the owner should be
/// notified: infrastructure failures are our problem, user-authored
/// definition errors are the repository owner's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailureClass {
    Infrastructure,
    UserError,
}

/// Outcome of rendering a single [`DefinitionDescriptor`].
#[derive(Debug)]
pub enum RenderResult {
    Success {
        descriptor: DefinitionDescriptor,
        pipeline: Pipeline,
    },
    Failure {
        descriptor: DefinitionDescriptor,
        class: RenderFailureClass,
        error: String,
    },
}

impl RenderResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, RenderResult::Success { .. })
    }

    #[must_use]
    pub fn descriptor(&self) -> &DefinitionDescriptor {
        match self {
            RenderResult::Success { descriptor, .. } => descriptor,
            RenderResult::Failure { descriptor, .. } => descriptor,
        }
    }
}

bitflags::bitflags! {
    /// Mirrors the bit-flag status of a single deploy attempt: a deploy may be
    /// simultaneously `CREATED` (the pipeline didn't exist before) and
    /// `SUCCEEDED`, which is why this is a bitset rather than an enum.
    #[derive(Serialize, Deserialize)]
    pub struct DeployStatus: u8 {
        const SUCCEEDED = 0b0001;
        const FAILED    = 0b0010;
        const SKIPPED   = 0b0100;
        const CREATED   = 0b1000;
    }
}

/// Outcome of deploying a single rendered [`Pipeline`] to its CI backend.
#[derive(Debug, Clone)]
pub struct DeployResult {
    pub pipeline_name: String,
    pub ci_target: CiTargetKey,
    pub status: DeployStatus,
    pub error: Option<String>,
}

impl DeployResult {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.contains(DeployStatus::SUCCEEDED) && !self.status.contains(DeployStatus::FAILED)
    }
}

/// Configures which existing pipelines should be torn down during a
/// replication run's cleanup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineCleanupPolicy {
    /// Remove any pipeline on the backend whose name wasn't produced by this
    /// replication run.
    RemoveOrphaned,
    /// Never delete pipelines, even if their definition disappeared.
    Preserve,
}

impl Default for PipelineCleanupPolicy {
    fn default() -> Self {
        Self::RemoveOrphaned
    }
}

/// Controls when a webhook-triggered push should abort builds already running
/// against the previous ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortObsoleteJobs {
    Never,
    OnForcePushOnly,
    Always,
}

impl Default for AbortObsoleteJobs {
    fn default() -> Self {
        Self::Never
    }
}

/// How many in-flight builds to consider for obsolescence, and under what
/// policy, when a new push arrives on a branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AbortConfig {
    #[serde(default = "AbortConfig::default_builds_to_consider")]
    pub builds_to_consider: u32,
    #[serde(default)]
    pub policy: AbortObsoleteJobs,
}

impl AbortConfig {
    fn default_builds_to_consider() -> u32 {
        5
    }
}

impl Default for AbortConfig {
    fn default() -> Self {
        Self {
            builds_to_consider: Self::default_builds_to_consider(),
            policy: AbortObsoleteJobs::default(),
        }
    }
}

/// Maps an org/repo to the CI backend it replicates to, along with the
/// branch-protection and trust policy applied to pull-request events from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMapping {
    pub name: String,
    pub ci_target: CiTargetKey,
    #[serde(default)]
    pub trusted_teams: Vec<String>,
    /// When `trusted_teams` is empty, whether PR label policy should treat
    /// every sender as untrusted (`true`) or as implicitly trusted (`false`,
    /// the default — most orgs that omit `trusted_teams` simply haven't
    /// opted into the policy at all).
    #[serde(default)]
    pub deny_on_empty_trusted_teams: bool,
    #[serde(default)]
    pub cleanup_policy: PipelineCleanupPolicy,
    #[serde(default)]
    pub abort_config: AbortConfig,
}

/// Current state of a single build, as reported by a CI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

/// A single build known to a CI backend, as returned by the resource listing
/// used to find obsolete in-flight builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub job_name: String,
    pub ref_: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub version_refs: Vec<String>,
}

impl Build {
    /// Whether this build's plan references `previous_ref`, meaning it was
    /// built against the commit a force-push just moved away from.
    #[must_use]
    pub fn contains_version_ref(&self, previous_ref: &str) -> bool {
        self.version_refs.iter().any(|r| r == previous_ref)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, BuildStatus::Pending | BuildStatus::Running)
    }
}

/// Groups [`DeployResult`]s by CI target, the shape the orchestrator's
/// cleanup phase and owner-notification phase both consume.
#[derive(Debug, Default)]
pub struct ReplicationResults {
    pub by_target: BTreeMap<CiTargetKey, Vec<DeployResult>>,
    pub render_failures: Vec<RenderResult>,
}

impl ReplicationResults {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.by_target
            .values()
            .flatten()
            .any(|r| r.status.contains(DeployStatus::FAILED))
            || !self.render_failures.is_empty()
    }
}

/// What triggered this render, stamped into the pipeline-metadata bundle the
/// template sees so a rendered pipeline can display its own provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOrigin {
    LocalInvocation,
    WebhookDispatch,
    ScheduledReplication,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_result_ok_requires_succeeded_without_failed() {
        let r = DeployResult {
            pipeline_name: "p".into(),
            ci_target: CiTargetKey {
                backend_name: "b".into(),
                team_name: "t".into(),
            },
            status: DeployStatus::SUCCEEDED | DeployStatus::CREATED,
            error: None,
        };
        assert!(r.ok());
    }

    #[test]
    fn deploy_result_not_ok_when_failed_bit_set_alongside_succeeded() {
        let r = DeployResult {
            pipeline_name: "p".into(),
            ci_target: CiTargetKey {
                backend_name: "b".into(),
                team_name: "t".into(),
            },
            status: DeployStatus::SUCCEEDED | DeployStatus::FAILED,
            error: Some("save race exhausted retry".into()),
        };
        assert!(!r.ok());
    }

    #[test]
    fn build_contains_version_ref() {
        let b = Build {
            id: "1".into(),
            job_name: "job".into(),
            ref_: "refs/heads/main".into(),
            status: BuildStatus::Running,
            version_refs: vec!["abc123".into()],
        };
        assert!(b.contains_version_ref("abc123"));
        assert!(!b.contains_version_ref("def456"));
    }

    #[test]
    fn replication_results_has_failures_checks_render_and_deploy() {
        let mut results = ReplicationResults::default();
        assert!(!results.has_failures());
        results.render_failures.push(RenderResult::Failure {
            descriptor: DefinitionDescriptor {
                pipeline_name: "p".into(),
                effective_pipeline_name: "p".into(),
                main_repo: MainRepository {
                    owner: "org".into(),
                    name: "repo".into(),
                    branch: "main".into(),
                    hostname: "github.example".into(),
                },
                base_definition: serde_json::Value::Null,
                override_definitions: vec![],
                ci_target: CiTargetKey {
                    backend_name: "b".into(),
                    team_name: "t".into(),
                },
                job_mapping_name: "org/repo".into(),
                secret_cfg_name: None,
                committish: "deadbeef".into(),
                enumeration_error: None,
            },
            class: RenderFailureClass::UserError,
            error: "bad yaml".into(),
        });
        assert!(results.has_failures());
    }
}
