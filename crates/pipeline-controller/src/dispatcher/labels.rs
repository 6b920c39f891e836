//! PR label trust policy (`_should_label`): whether an inbound PR sender is
//! privileged enough to have required labels auto-applied on their behalf.

use pipeline_config::JobMapping;
use pipeline_scm::GithubClient;

/// A parsed `trusted_teams` entry: either `org/team` (any host) or
/// `host/org/team` (host-scoped).
struct TrustedTeam<'a> {
    host: Option<&'a str>,
    org: &'a str,
    team: &'a str,
}

fn parse_trusted_team(raw: &str) -> Option<TrustedTeam<'_>> {
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.as_slice() {
        [org, team] => Some(TrustedTeam { host: None, org, team }),
        [host, org, team] => Some(TrustedTeam {
            host: Some(host),
            org,
            team,
        }),
        _ => None,
    }
}

/// Decides whether `sender` may cause required labels to be auto-applied on
/// a PR against `hostname`/`org`.
///
/// If `trusted_teams` is configured and at least one entry survives
/// host-filtering, sender must belong to one of those teams. If
/// `trusted_teams` is configured but every entry is filtered out by host
/// (the set becomes empty), `deny_on_empty_trusted_teams` decides whether
/// that counts as "nobody trusted" (deny) or "no policy for this host"
/// (fall back to org membership) — the Open Question toggle from DESIGN.md.
/// If `trusted_teams` was never configured at all, org membership alone
/// decides.
pub async fn should_label(
    github: &dyn GithubClient,
    mapping: &JobMapping,
    hostname: &str,
    org: &str,
    sender: &str,
) -> bool {
    if mapping.trusted_teams.is_empty() {
        return org_member(github, org, sender).await;
    }

    let host_matching: Vec<TrustedTeam<'_>> = mapping
        .trusted_teams
        .iter()
        .filter_map(|raw| parse_trusted_team(raw))
        .filter(|team| team.host.is_none_or(|h| h == hostname))
        .collect();

    if host_matching.is_empty() {
        if mapping.deny_on_empty_trusted_teams {
            return false;
        }
        return org_member(github, org, sender).await;
    }

    for team in &host_matching {
        match github.is_team_member(team.org, team.team, sender).await {
            Ok(true) => return true,
            Ok(false) => continue,
            Err(e) => {
                tracing::warn!(org = team.org, team = team.team, error = %e, "failed to check team membership");
            }
        }
    }
    false
}

async fn org_member(github: &dyn GithubClient, org: &str, sender: &str) -> bool {
    match github.is_org_member(org, sender).await {
        Ok(member) => member,
        Err(e) => {
            tracing::warn!(org, sender, error = %e, "failed to check org membership");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_config::CiTargetKey;
    use pipeline_scm::{
        FileContents, Issue, IssueEdit, PullRequest, RepoSlug, Release, Repository, ScmError,
    };

    struct FakeClient {
        org_members: Vec<&'static str>,
        team_members: Vec<(&'static str, &'static str, &'static str)>,
    }

    #[async_trait]
    impl GithubClient for FakeClient {
        async fn repository(&self, _repo: &RepoSlug) -> Result<Repository, ScmError> {
            unimplemented!()
        }
        async fn issue(&self, _repo: &RepoSlug, _number: u64) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn create_issue(&self, _repo: &RepoSlug, _edit: &IssueEdit) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn update_issue(&self, _repo: &RepoSlug, _number: u64, _edit: &IssueEdit) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn close_issue(&self, _repo: &RepoSlug, _number: u64) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn add_issue_comment(&self, _repo: &RepoSlug, _number: u64, _body: &str) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn pull_request(&self, _repo: &RepoSlug, _number: u64) -> Result<PullRequest, ScmError> {
            unimplemented!()
        }
        async fn add_labels(&self, _repo: &RepoSlug, _number: u64, _labels: &[String]) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn remove_label(&self, _repo: &RepoSlug, _number: u64, _label: &str) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn is_org_member(&self, _org: &str, username: &str) -> Result<bool, ScmError> {
            Ok(self.org_members.contains(&username))
        }
        async fn is_team_member(&self, org: &str, team_slug: &str, username: &str) -> Result<bool, ScmError> {
            Ok(self.team_members.contains(&(org, team_slug, username)))
        }
        async fn team_members(&self, _org: &str, _team_slug: &str) -> Result<Vec<String>, ScmError> {
            Ok(vec![])
        }
        async fn file_contents(
            &self,
            _repo: &RepoSlug,
            _path: &str,
            _git_ref: Option<&str>,
        ) -> Result<Option<FileContents>, ScmError> {
            Ok(None)
        }
        async fn create_or_update_file(
            &self,
            _repo: &RepoSlug,
            _path: &str,
            _content: &str,
            _commit_message: &str,
            _branch: &str,
        ) -> Result<Option<String>, ScmError> {
            unimplemented!()
        }
        async fn branches(&self, _repo: &RepoSlug) -> Result<Vec<String>, ScmError> {
            unimplemented!()
        }
        async fn create_tag(&self, _repo: &RepoSlug, _tag_name: &str, _target_sha: &str, _message: &str) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn create_release(
            &self,
            _repo: &RepoSlug,
            _tag_name: &str,
            _body: &str,
            _draft: bool,
            _prerelease: bool,
        ) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn releases(&self, _repo: &RepoSlug) -> Result<Vec<Release>, ScmError> {
            unimplemented!()
        }
        async fn user_email(&self, _username: &str) -> Result<Option<String>, ScmError> {
            Ok(None)
        }
        async fn commit_author_committer_emails(
            &self,
            _repo: &RepoSlug,
            _sha: &str,
        ) -> Result<(Option<String>, Option<String>), ScmError> {
            unimplemented!()
        }
    }

    fn mapping(trusted_teams: Vec<&str>, deny_on_empty: bool) -> JobMapping {
        JobMapping {
            name: "org/repo".into(),
            ci_target: CiTargetKey {
                backend_name: "main".into(),
                team_name: "team-a".into(),
            },
            trusted_teams: trusted_teams.into_iter().map(String::from).collect(),
            deny_on_empty_trusted_teams: deny_on_empty,
            cleanup_policy: Default::default(),
            abort_config: Default::default(),
        }
    }

    #[tokio::test]
    async fn no_trusted_teams_falls_back_to_org_membership() {
        let client = FakeClient {
            org_members: vec!["alice"],
            team_members: vec![],
        };
        let mapping = mapping(vec![], false);
        assert!(should_label(&client, &mapping, "github.com", "org", "alice").await);
        assert!(!should_label(&client, &mapping, "github.com", "org", "mallory").await);
    }

    #[tokio::test]
    async fn trusted_team_member_is_allowed_regardless_of_org_membership() {
        let client = FakeClient {
            org_members: vec![],
            team_members: vec![("org", "reviewers", "alice")],
        };
        let mapping = mapping(vec!["org/reviewers"], false);
        assert!(should_label(&client, &mapping, "github.com", "org", "alice").await);
    }

    #[tokio::test]
    async fn host_scoped_entry_only_applies_to_matching_host() {
        let client = FakeClient {
            org_members: vec![],
            team_members: vec![("org", "reviewers", "alice")],
        };
        let mapping = mapping(vec!["github.enterprise.example/org/reviewers"], false);
        assert!(!should_label(&client, &mapping, "github.com", "org", "alice").await);
    }

    #[tokio::test]
    async fn empty_after_host_filter_denies_when_toggle_set() {
        let client = FakeClient {
            org_members: vec!["alice"],
            team_members: vec![],
        };
        let mapping = mapping(vec!["github.enterprise.example/org/reviewers"], true);
        assert!(!should_label(&client, &mapping, "github.com", "org", "alice").await);
    }

    #[tokio::test]
    async fn empty_after_host_filter_falls_back_to_org_membership_by_default() {
        let client = FakeClient {
            org_members: vec!["alice"],
            team_members: vec![],
        };
        let mapping = mapping(vec!["github.enterprise.example/org/reviewers"], false);
        assert!(should_label(&client, &mapping, "github.com", "org", "alice").await);
    }
}
