//! Recipient resolution for owner notifications: CODEOWNERS first, falling
//! back to the head commit's author and committer when CODEOWNERS yields
//! nobody (`mailutil.py::determine_mail_recipients`).

use pipeline_scm::{all_owners, enumerate_codeowners, resolve_email_addresses, GithubClient, RepoSlug};
use tracing::{debug, warn};

/// Resolves the set of email addresses that should be notified about a
/// rendering failure on `repo`. Returns an empty vec (not an error) when
/// nobody can be resolved — callers are expected to log and skip sending.
pub async fn resolve_owner_recipients(
    client: &dyn GithubClient,
    repo: &RepoSlug,
    git_ref: Option<&str>,
    head_sha: &str,
) -> Vec<String> {
    let entries = match enumerate_codeowners(client, repo, git_ref).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(%repo, error = %e, "failed to enumerate CODEOWNERS, falling back to commit metadata");
            vec![]
        }
    };

    let owners = all_owners(&entries);
    let addresses = resolve_email_addresses(client, &owners).await;
    if !addresses.is_empty() {
        debug!(%repo, count = addresses.len(), "resolved recipients from CODEOWNERS");
        return addresses;
    }

    debug!(%repo, "CODEOWNERS yielded no recipients, falling back to head commit author/committer");
    match client.commit_author_committer_emails(repo, head_sha).await {
        Ok((author, committer)) => {
            let mut fallback: Vec<String> = [author, committer].into_iter().flatten().collect();
            fallback.sort();
            fallback.dedup();
            fallback
        }
        Err(e) => {
            warn!(%repo, sha = %head_sha, error = %e, "failed to read head commit author/committer");
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_scm::{
        FileContents, Issue, IssueEdit, PullRequest, Repository, ScmError,
    };

    struct FakeClient {
        codeowners_body: Option<String>,
        commit_author: Option<String>,
        commit_committer: Option<String>,
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
        async fn update_issue(
            &self,
            _repo: &RepoSlug,
            _number: u64,
            _edit: &IssueEdit,
        ) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn close_issue(&self, _repo: &RepoSlug, _number: u64) -> Result<Issue, ScmError> {
            unimplemented!()
        }
        async fn add_issue_comment(
            &self,
            _repo: &RepoSlug,
            _number: u64,
            _body: &str,
        ) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn pull_request(&self, _repo: &RepoSlug, _number: u64) -> Result<PullRequest, ScmError> {
            unimplemented!()
        }
        async fn add_labels(
            &self,
            _repo: &RepoSlug,
            _number: u64,
            _labels: &[String],
        ) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn remove_label(&self, _repo: &RepoSlug, _number: u64, _label: &str) -> Result<(), ScmError> {
            unimplemented!()
        }
        async fn is_org_member(&self, _org: &str, _username: &str) -> Result<bool, ScmError> {
            unimplemented!()
        }
        async fn is_team_member(
            &self,
            _org: &str,
            _team_slug: &str,
            _username: &str,
        ) -> Result<bool, ScmError> {
            unimplemented!()
        }
        async fn team_members(&self, _org: &str, _team_slug: &str) -> Result<Vec<String>, ScmError> {
            Ok(vec![])
        }
        async fn file_contents(
            &self,
            _repo: &RepoSlug,
            path: &str,
            _git_ref: Option<&str>,
        ) -> Result<Option<FileContents>, ScmError> {
            if path == "CODEOWNERS" {
                Ok(self.codeowners_body.clone().map(|content| FileContents {
                    content,
                    sha: "abc".into(),
                }))
            } else {
                Ok(None)
            }
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
        async fn create_tag(
            &self,
            _repo: &RepoSlug,
            _tag_name: &str,
            _target_sha: &str,
            _message: &str,
        ) -> Result<(), ScmError> {
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
        async fn releases(&self, _repo: &RepoSlug) -> Result<Vec<pipeline_scm::Release>, ScmError> {
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
            Ok((self.commit_author.clone(), self.commit_committer.clone()))
        }
    }

    #[tokio::test]
    async fn falls_back_to_head_commit_when_codeowners_has_no_entries() {
        let client = FakeClient {
            codeowners_body: None,
            commit_author: Some("Author@Example.com".into()),
            commit_committer: Some("committer@example.com".into()),
        };
        let repo = RepoSlug {
            owner: "org".into(),
            name: "repo".into(),
        };
        let recipients = resolve_owner_recipients(&client, &repo, None, "deadbeef").await;
        assert_eq!(
            recipients,
            vec!["Author@Example.com".to_string(), "committer@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn deduplicates_identical_author_and_committer() {
        let client = FakeClient {
            codeowners_body: None,
            commit_author: Some("same@example.com".into()),
            commit_committer: Some("same@example.com".into()),
        };
        let repo = RepoSlug {
            owner: "org".into(),
            name: "repo".into(),
        };
        let recipients = resolve_owner_recipients(&client, &repo, None, "deadbeef").await;
        assert_eq!(recipients, vec!["same@example.com".to_string()]);
    }
}
