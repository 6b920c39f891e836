//! `GithubClient`: the narrow GitHub REST surface the controller and
//! notifier crates depend on. The concrete `HttpGithubClient` uses a
//! `reqwest::Client` with default headers plus a per-request bearer token.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::error::ScmError;
use crate::model::{
    FileContents, Issue, IssueEdit, PullRequest, RepoSlug, Repository,
};

#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn repository(&self, repo: &RepoSlug) -> Result<Repository, ScmError>;

    async fn issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError>;
    async fn create_issue(&self, repo: &RepoSlug, edit: &IssueEdit) -> Result<Issue, ScmError>;
    async fn update_issue(
        &self,
        repo: &RepoSlug,
        number: u64,
        edit: &IssueEdit,
    ) -> Result<Issue, ScmError>;
    async fn close_issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError>;
    async fn add_issue_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<(), ScmError>;

    async fn pull_request(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ScmError>;
    async fn add_labels(
        &self,
        repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> Result<(), ScmError>;
    async fn remove_label(&self, repo: &RepoSlug, number: u64, label: &str) -> Result<(), ScmError>;

    /// `true` iff `username` is a member of `org` (per `github/util.py`'s
    /// `_add_user_to_team`'s use of `team.is_member`, generalized to plain org
    /// membership for the trust-policy check in `whd/dispatcher.py`).
    async fn is_org_member(&self, org: &str, username: &str) -> Result<bool, ScmError>;
    async fn is_team_member(
        &self,
        org: &str,
        team_slug: &str,
        username: &str,
    ) -> Result<bool, ScmError>;

    /// Usernames belonging to `org/team_slug`, used to expand `@org/team`
    /// CODEOWNERS handles.
    async fn team_members(&self, org: &str, team_slug: &str) -> Result<Vec<String>, ScmError>;

    async fn file_contents(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContents>, ScmError>;

    /// Creates the file if absent, updates it (matching the existing blob
    /// `sha`) if present and different, or is a no-op if the content is
    /// already identical — mirrors `GitHubRepositoryHelper.create_or_update_file`.
    /// Returns the resulting commit sha, or `None` if nothing changed.
    async fn create_or_update_file(
        &self,
        repo: &RepoSlug,
        path: &str,
        content: &str,
        commit_message: &str,
        branch: &str,
    ) -> Result<Option<String>, ScmError>;

    async fn branches(&self, repo: &RepoSlug) -> Result<Vec<String>, ScmError>;

    async fn create_tag(
        &self,
        repo: &RepoSlug,
        tag_name: &str,
        target_sha: &str,
        message: &str,
    ) -> Result<(), ScmError>;

    async fn create_release(
        &self,
        repo: &RepoSlug,
        tag_name: &str,
        body: &str,
        draft: bool,
        prerelease: bool,
    ) -> Result<(), ScmError>;
    async fn releases(&self, repo: &RepoSlug) -> Result<Vec<crate::model::Release>, ScmError>;

    /// Resolves a GitHub username's public email address, or `None` if the
    /// account has none set (`github/util.py::retrieve_email_addresses`).
    async fn user_email(&self, username: &str) -> Result<Option<String>, ScmError>;

    /// The author and committer email addresses recorded on a single commit,
    /// the fallback recipient source when CODEOWNERS yields nobody
    /// (`mailutil.py::determine_head_commit_recipients`, adapted to read the
    /// commit metadata over the API rather than from a local git checkout).
    async fn commit_author_committer_emails(
        &self,
        repo: &RepoSlug,
        sha: &str,
    ) -> Result<(Option<String>, Option<String>), ScmError>;
}

pub struct HttpGithubClient {
    http: reqwest::Client,
    api_base_url: String,
    token: String,
}

impl HttpGithubClient {
    pub fn new(api_base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ScmError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("pipeline-sync/1.0"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.into(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ScmError> {
        let resp = req.send().await?;
        let url = resp.url().to_string();
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScmError::NotFound(url));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScmError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(resp.json().await?)
    }

    async fn send_ok(&self, req: reqwest::RequestBuilder) -> Result<(), ScmError> {
        let resp = req.send().await?;
        let url = resp.url().to_string();
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScmError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ContentsUpdate<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(serde::Deserialize)]
struct CommitRef {
    sha: String,
}
#[derive(serde::Deserialize)]
struct ContentsUpdateResponse {
    commit: CommitRef,
}

#[derive(serde::Deserialize)]
struct TeamMembership {
    state: String,
}

#[derive(serde::Deserialize)]
struct GithubUser {
    email: Option<String>,
}

#[async_trait]
impl GithubClient for HttpGithubClient {
    async fn repository(&self, repo: &RepoSlug) -> Result<Repository, ScmError> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::GET, &path))
            .await
    }

    async fn issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError> {
        let path = format!("/repos/{}/{}/issues/{number}", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::GET, &path))
            .await
    }

    async fn create_issue(&self, repo: &RepoSlug, edit: &IssueEdit) -> Result<Issue, ScmError> {
        let path = format!("/repos/{}/{}/issues", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::POST, &path).json(edit))
            .await
    }

    async fn update_issue(
        &self,
        repo: &RepoSlug,
        number: u64,
        edit: &IssueEdit,
    ) -> Result<Issue, ScmError> {
        let path = format!("/repos/{}/{}/issues/{number}", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::PATCH, &path).json(edit))
            .await
    }

    async fn close_issue(&self, repo: &RepoSlug, number: u64) -> Result<Issue, ScmError> {
        let edit = IssueEdit {
            state: Some(crate::model::IssueState::Closed),
            ..Default::default()
        };
        self.update_issue(repo, number, &edit).await
    }

    async fn add_issue_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
    ) -> Result<(), ScmError> {
        let path = format!("/repos/{}/{}/issues/{number}/comments", repo.owner, repo.name);
        #[derive(Serialize)]
        struct Comment<'a> {
            body: &'a str,
        }
        self.send_ok(
            self.request(reqwest::Method::POST, &path)
                .json(&Comment { body }),
        )
        .await
    }

    async fn pull_request(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ScmError> {
        let path = format!("/repos/{}/{}/pulls/{number}", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::GET, &path))
            .await
    }

    async fn add_labels(
        &self,
        repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> Result<(), ScmError> {
        let path = format!("/repos/{}/{}/issues/{number}/labels", repo.owner, repo.name);
        #[derive(Serialize)]
        struct AddLabels<'a> {
            labels: &'a [String],
        }
        self.send_ok(
            self.request(reqwest::Method::POST, &path)
                .json(&AddLabels { labels }),
        )
        .await
    }

    async fn remove_label(&self, repo: &RepoSlug, number: u64, label: &str) -> Result<(), ScmError> {
        let path = format!(
            "/repos/{}/{}/issues/{number}/labels/{}",
            repo.owner,
            repo.name,
            urlencoding_encode(label),
        );
        let resp = self.request(reqwest::Method::DELETE, &path).send().await?;
        let status = resp.status();
        // GitHub 404s if the label was never applied; treat that as success.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScmError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(())
    }

    async fn is_org_member(&self, org: &str, username: &str) -> Result<bool, ScmError> {
        let path = format!("/orgs/{org}/members/{username}");
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        Ok(resp.status() == reqwest::StatusCode::NO_CONTENT)
    }

    async fn is_team_member(
        &self,
        org: &str,
        team_slug: &str,
        username: &str,
    ) -> Result<bool, ScmError> {
        let path = format!("/orgs/{org}/teams/{team_slug}/memberships/{username}");
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScmError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        let membership: TeamMembership = resp.json().await?;
        Ok(membership.state == "active")
    }

    async fn team_members(&self, org: &str, team_slug: &str) -> Result<Vec<String>, ScmError> {
        #[derive(serde::Deserialize)]
        struct Member {
            login: String,
        }
        let path = format!("/orgs/{org}/teams/{team_slug}/members");
        let members: Vec<Member> = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    async fn file_contents(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<FileContents>, ScmError> {
        let mut url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path);
        if let Some(r) = git_ref {
            url = format!("{url}?ref={r}");
        }
        let resp = self.request(reqwest::Method::GET, &url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let response_url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScmError::UnexpectedStatus {
                status: status.as_u16(),
                url: response_url,
                body,
            });
        }
        let parsed: ContentsResponse = resp.json().await?;
        let decoded = BASE64.decode(parsed.content.replace('\n', ""))?;
        let content = String::from_utf8(decoded)?;
        Ok(Some(FileContents {
            content,
            sha: parsed.sha,
        }))
    }

    async fn create_or_update_file(
        &self,
        repo: &RepoSlug,
        path: &str,
        content: &str,
        commit_message: &str,
        branch: &str,
    ) -> Result<Option<String>, ScmError> {
        let existing = self.file_contents(repo, path, Some(branch)).await?;
        if let Some(existing) = &existing {
            if existing.content == content {
                debug!(%repo, path, "file contents already up to date, nothing to do");
                return Ok(None);
            }
        }

        let url = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path);
        let body = ContentsUpdate {
            message: commit_message,
            content: BASE64.encode(content.as_bytes()),
            branch,
            sha: existing.as_ref().map(|c| c.sha.as_str()),
        };
        let response: ContentsUpdateResponse = self
            .send_json(self.request(reqwest::Method::PUT, &url).json(&body))
            .await?;
        Ok(Some(response.commit.sha))
    }

    async fn branches(&self, repo: &RepoSlug) -> Result<Vec<String>, ScmError> {
        #[derive(serde::Deserialize)]
        struct Branch {
            name: String,
        }
        let path = format!("/repos/{}/{}/branches", repo.owner, repo.name);
        let branches: Vec<Branch> = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn create_tag(
        &self,
        repo: &RepoSlug,
        tag_name: &str,
        target_sha: &str,
        message: &str,
    ) -> Result<(), ScmError> {
        #[derive(Serialize)]
        struct CreateTagRequest<'a> {
            tag: &'a str,
            message: &'a str,
            object: &'a str,
            #[serde(rename = "type")]
            object_type: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct TagObjectResponse {
            sha: String,
        }
        let path = format!("/repos/{}/{}/git/tags", repo.owner, repo.name);
        let tag_object: TagObjectResponse = self
            .send_json(self.request(reqwest::Method::POST, &path).json(&CreateTagRequest {
                tag: tag_name,
                message,
                object: target_sha,
                object_type: "commit",
            }))
            .await?;

        #[derive(Serialize)]
        struct CreateRefRequest<'a> {
            #[serde(rename = "ref")]
            ref_: String,
            sha: &'a str,
        }
        let refs_path = format!("/repos/{}/{}/git/refs", repo.owner, repo.name);
        self.send_ok(
            self.request(reqwest::Method::POST, &refs_path)
                .json(&CreateRefRequest {
                    ref_: format!("refs/tags/{tag_name}"),
                    sha: &tag_object.sha,
                }),
        )
        .await
    }

    async fn create_release(
        &self,
        repo: &RepoSlug,
        tag_name: &str,
        body: &str,
        draft: bool,
        prerelease: bool,
    ) -> Result<(), ScmError> {
        #[derive(Serialize)]
        struct CreateReleaseRequest<'a> {
            tag_name: &'a str,
            body: &'a str,
            draft: bool,
            prerelease: bool,
        }
        let path = format!("/repos/{}/{}/releases", repo.owner, repo.name);
        self.send_ok(
            self.request(reqwest::Method::POST, &path)
                .json(&CreateReleaseRequest {
                    tag_name,
                    body,
                    draft,
                    prerelease,
                }),
        )
        .await
    }

    async fn releases(&self, repo: &RepoSlug) -> Result<Vec<crate::model::Release>, ScmError> {
        let path = format!("/repos/{}/{}/releases", repo.owner, repo.name);
        self.send_json(self.request(reqwest::Method::GET, &path))
            .await
    }

    async fn user_email(&self, username: &str) -> Result<Option<String>, ScmError> {
        let path = format!("/users/{username}");
        let user: GithubUser = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(user.email)
    }

    async fn commit_author_committer_emails(
        &self,
        repo: &RepoSlug,
        sha: &str,
    ) -> Result<(Option<String>, Option<String>), ScmError> {
        #[derive(serde::Deserialize)]
        struct GitUserIdentity {
            email: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct GitCommitDetail {
            author: Option<GitUserIdentity>,
            committer: Option<GitUserIdentity>,
        }
        #[derive(serde::Deserialize)]
        struct CommitResponse {
            commit: GitCommitDetail,
        }

        let path = format!("/repos/{}/{}/commits/{sha}", repo.owner, repo.name);
        let response: CommitResponse = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok((
            response.commit.author.and_then(|a| a.email),
            response.commit.committer.and_then(|c| c.email),
        ))
    }
}

fn urlencoding_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}
