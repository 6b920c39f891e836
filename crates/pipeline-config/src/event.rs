//! Inbound webhook event model. Each variant carries exactly the fields the
//! dispatcher needs to classify and route it; full payload passthrough lives
//! in `raw`, for handlers that need details this type doesn't surface.

use serde::{Deserialize, Serialize};

/// The three GitHub webhook event types the dispatcher understands. Anything
/// else is accepted by the HTTP layer and silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Push(PushEvent),
    Create(CreateEvent),
    PullRequest(PullRequestEvent),
}

impl Event {
    #[must_use]
    pub fn repository(&self) -> &RepositoryRef {
        match self {
            Event::Push(e) => &e.repository,
            Event::Create(e) => &e.repository,
            Event::PullRequest(e) => &e.repository,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Push(_) => "push",
            Event::Create(_) => "create",
            Event::PullRequest(_) => "pull_request",
        }
    }
}

/// The repository a webhook event was raised against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub host: String,
    pub org: String,
    pub name: String,
}

impl RepositoryRef {
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Branch,
    Tag,
}

/// GitHub `push` event: a ref was updated (or force-updated) to a new commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: RepositoryRef,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub forced: bool,
    pub head_commit_message: Option<String>,
    /// Paths touched across every commit in the push, used to decide whether
    /// `.ci/pipeline_definitions` changed and thus whether to re-replicate.
    #[serde(default)]
    pub modified_paths: Vec<String>,
}

/// Path the pipeline-definitions enumerator watches for; a push that touches
/// any file under here triggers re-replication of that repository.
pub const PIPELINE_DEFINITIONS_PATH: &str = ".ci/pipeline_definitions";

impl PushEvent {
    /// `[skip ci]`/`[ci skip]` anywhere in the head commit message suppresses
    /// replication entirely for this push, matching common CI convention.
    #[must_use]
    pub fn skip_ci_requested(&self) -> bool {
        self.head_commit_message
            .as_deref()
            .map(|m| {
                let lower = m.to_lowercase();
                lower.contains("[skip ci]") || lower.contains("[ci skip]")
            })
            .unwrap_or(false)
    }

    /// Whether this push touched the pipeline-definitions file or anything
    /// beneath it.
    #[must_use]
    pub fn modified_pipeline_definitions(&self) -> bool {
        self.modified_paths
            .iter()
            .any(|p| p == PIPELINE_DEFINITIONS_PATH || p.starts_with(PIPELINE_DEFINITIONS_PATH))
    }

    /// The previous commit ref (`before`), the one any obsolete in-flight
    /// build's plan must reference to be abortable.
    #[must_use]
    pub fn previous_ref(&self) -> &str {
        &self.before
    }
}

/// GitHub `create` event: a new branch or tag was created. Only `branch`
/// creations are relevant to pipeline replication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub repository: RepositoryRef,
    pub ref_type: RefType,
    #[serde(rename = "ref")]
    pub ref_: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
    Labeled,
    Unlabeled,
    Closed,
    /// Any action this system doesn't act on; carried rather than rejected so
    /// the webhook endpoint can still return 200 for it.
    #[serde(other)]
    Other,
}

/// GitHub `pull_request` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub repository: RepositoryRef,
    pub action: PullRequestAction,
    pub number: u64,
    pub sender_login: String,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: String,
    /// The head repository (may differ from `repository` for a fork PR).
    pub head_repo: RepositoryRef,
    /// The single label this event is about, present only on `labeled`
    /// actions.
    #[serde(default)]
    pub label: Option<String>,
    /// Every label currently on the PR, regardless of `action`.
    #[serde(default)]
    pub label_names: Vec<String>,
    /// Paths touched by this PR's commits, used to decide whether the
    /// pipeline-definitions file needs (re)validation.
    #[serde(default)]
    pub modified_paths: Vec<String>,
}

impl PullRequestEvent {
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        matches!(
            self.action,
            PullRequestAction::Opened
                | PullRequestAction::Reopened
                | PullRequestAction::Labeled
                | PullRequestAction::Synchronize
        )
    }

    #[must_use]
    pub fn modified_pipeline_definitions(&self) -> bool {
        self.modified_paths
            .iter()
            .any(|p| p == crate::event::PIPELINE_DEFINITIONS_PATH || p.starts_with(crate::event::PIPELINE_DEFINITIONS_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_ci_matches_either_bracket_order_case_insensitively() {
        let mk = |msg: &str| PushEvent {
            repository: RepositoryRef {
                host: "github.example".into(),
                org: "o".into(),
                name: "r".into(),
            },
            ref_: "refs/heads/main".into(),
            before: "a".into(),
            after: "b".into(),
            forced: false,
            head_commit_message: Some(msg.to_string()),
            modified_paths: vec![],
        };
        assert!(mk("docs: update readme [skip ci]").skip_ci_requested());
        assert!(mk("WIP [CI SKIP]").skip_ci_requested());
        assert!(!mk("normal commit").skip_ci_requested());
    }

    #[test]
    fn modified_pipeline_definitions_matches_exact_path_and_subpaths() {
        let mk = |paths: &[&str]| PushEvent {
            repository: RepositoryRef {
                host: "github.example".into(),
                org: "o".into(),
                name: "r".into(),
            },
            ref_: "refs/heads/main".into(),
            before: "a".into(),
            after: "b".into(),
            forced: false,
            head_commit_message: None,
            modified_paths: paths.iter().map(|p| p.to_string()).collect(),
        };
        assert!(mk(&[".ci/pipeline_definitions", "README.md"]).modified_pipeline_definitions());
        assert!(!mk(&["README.md"]).modified_pipeline_definitions());
    }

    #[test]
    fn event_tag_roundtrips_through_json() {
        let ev = Event::Create(CreateEvent {
            repository: RepositoryRef {
                host: "github.example".into(),
                org: "o".into(),
                name: "r".into(),
            },
            ref_type: RefType::Branch,
            ref_: "refs/heads/feature-x".into(),
        });
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"create\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "create");
    }

    #[test]
    fn pull_request_actionability() {
        let mk = |action| PullRequestEvent {
            repository: RepositoryRef {
                host: "github.example".into(),
                org: "o".into(),
                name: "r".into(),
            },
            action,
            number: 1,
            sender_login: "someone".into(),
            head_ref: "refs/heads/feature".into(),
            head_sha: "abc".into(),
            base_ref: "refs/heads/main".into(),
            head_repo: RepositoryRef {
                host: "github.example".into(),
                org: "o".into(),
                name: "r".into(),
            },
            label: None,
            label_names: vec![],
            modified_paths: vec![],
        };
        assert!(mk(PullRequestAction::Opened).is_actionable());
        assert!(mk(PullRequestAction::Synchronize).is_actionable());
        assert!(!mk(PullRequestAction::Unlabeled).is_actionable());
        assert!(!mk(PullRequestAction::Other).is_actionable());
    }
}
