//! Wire-adjacent types for the subset of the GitHub REST API this crate
//! needs. Deliberately narrower than the full GitHub schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default = "default_branch_name", rename = "default_branch")]
    pub default_branch: String,
}

fn default_branch_name() -> String {
    "master".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// Fields supplied when creating or editing an issue. `None` leaves the
/// corresponding GitHub field untouched on an edit (matches the
/// `github3.issue.edit(**kwargs)` sparse-update idiom in `github/util.py`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub sha: String,
}

/// Base64-decoded contents of a repository file, plus the blob `sha` GitHub
/// needs as the `If-Match`-style precondition on an update (`github/util.py`'s
/// `create_or_update_file`).
#[derive(Debug, Clone)]
pub struct FileContents {
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

/// One line of a `CODEOWNERS` file: a path-pattern and the owners (usernames
/// or `@org/team` handles) responsible for it. Mirrors
/// `github.codeowners.enumerate_codeowners_from_remote_repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeownersEntry {
    pub pattern: String,
    pub owners: Vec<String>,
}

/// Candidate paths GitHub recognizes a `CODEOWNERS` file at, checked in this
/// order.
pub const CODEOWNERS_PATHS: &[&str] = &["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

/// Parses a `CODEOWNERS` file body: blank lines and `#`-comments are
/// skipped, each remaining line is `<pattern> <owner> [<owner> ...]`.
#[must_use]
pub fn parse_codeowners(body: &str) -> Vec<CodeownersEntry> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pattern = parts.next()?.to_string();
            let owners: Vec<String> = parts.map(str::to_string).collect();
            if owners.is_empty() {
                return None;
            }
            Some(CodeownersEntry { pattern, owners })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codeowners_body_ignoring_comments_and_blanks() {
        let body = "\
# top level owners
*       @org/platform-team

# docs
/docs/  alice bob
";
        let entries = parse_codeowners(body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pattern, "*");
        assert_eq!(entries[0].owners, vec!["@org/platform-team".to_string()]);
        assert_eq!(entries[1].pattern, "/docs/");
        assert_eq!(entries[1].owners, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn owner_less_lines_are_skipped() {
        let entries = parse_codeowners("*\n");
        assert!(entries.is_empty());
    }
}
