//! GitHub client trait, CODEOWNERS resolution, and the PR/issue/label
//! helpers the controller crate's webhook dispatcher and notifier depend on.

pub mod client;
pub mod codeowners;
pub mod error;
pub mod model;

pub use client::{GithubClient, HttpGithubClient};
pub use codeowners::{all_owners, enumerate_codeowners, resolve_email_addresses};
pub use error::ScmError;
pub use model::{
    CodeownersEntry, FileContents, Issue, IssueEdit, IssueState, Label, PullRequest,
    PullRequestRef, Release, RepoSlug, Repository, User,
};
