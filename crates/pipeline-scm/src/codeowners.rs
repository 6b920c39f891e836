//! CODEOWNERS enumeration and owner-to-email resolution, used by the
//! notifier to find who to page for a broken pipeline render
//! (`github/util.py::retrieve_email_addresses`, generalized to also accept
//! `@org/team` handles by expanding team membership).

use tracing::{debug, warn};

use crate::client::GithubClient;
use crate::error::ScmError;
use crate::model::{parse_codeowners, CodeownersEntry, RepoSlug, CODEOWNERS_PATHS};

/// Fetches and parses the repository's `CODEOWNERS` file, trying each
/// candidate path in turn. Returns an empty vec (not an error) if none of the
/// candidate paths exist.
pub async fn enumerate_codeowners(
    client: &dyn GithubClient,
    repo: &RepoSlug,
    git_ref: Option<&str>,
) -> Result<Vec<CodeownersEntry>, ScmError> {
    for candidate in CODEOWNERS_PATHS {
        match client.file_contents(repo, candidate, git_ref).await? {
            Some(contents) => {
                debug!(%repo, path = %candidate, "found CODEOWNERS file");
                return Ok(parse_codeowners(&contents.content));
            }
            None => continue,
        }
    }
    debug!(%repo, "no CODEOWNERS file found at any candidate path");
    Ok(vec![])
}

/// Every distinct owner mentioned across all entries, in first-seen order.
#[must_use]
pub fn all_owners(entries: &[CodeownersEntry]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut owners = Vec::new();
    for entry in entries {
        for owner in &entry.owners {
            if seen.insert(owner.clone()) {
                owners.push(owner.clone());
            }
        }
    }
    owners
}

/// Resolves a list of GitHub owner handles to email addresses. A handle of
/// the form `@org/team` is expanded to its team members first; plain
/// `@username` or bare `username` handles are resolved directly. Handles with
/// no public email are silently dropped, matching
/// `retrieve_email_addresses`'s `filter(None, map(retrieve_email, ...))`.
pub async fn resolve_email_addresses(client: &dyn GithubClient, owners: &[String]) -> Vec<String> {
    let mut usernames = Vec::new();
    for owner in owners {
        let handle = owner.trim_start_matches('@');
        if let Some((team_org, team_slug)) = handle.split_once('/') {
            match client.team_members(team_org, team_slug).await {
                Ok(members) => usernames.extend(members),
                Err(e) => warn!(owner = %owner, error = %e, "failed to expand team handle"),
            }
        } else {
            usernames.push(handle.to_string());
        }
    }

    let mut addresses = Vec::new();
    for username in usernames {
        match client.user_email(&username).await {
            Ok(Some(email)) => addresses.push(email),
            Ok(None) => debug!(user = %username, "GitHub user has no public email address"),
            Err(e) => warn!(user = %username, error = %e, "failed to resolve email address"),
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_owners_deduplicates_preserving_first_seen_order() {
        let entries = vec![
            CodeownersEntry {
                pattern: "*".to_string(),
                owners: vec!["alice".to_string(), "bob".to_string()],
            },
            CodeownersEntry {
                pattern: "/docs/".to_string(),
                owners: vec!["bob".to_string(), "carol".to_string()],
            },
        ];
        assert_eq!(
            all_owners(&entries),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }
}
