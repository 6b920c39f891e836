//! Parsing and formatting for OCI image references (`host/repo:tag` or
//! `host/repo@sha256:...`).

use std::fmt;

use crate::error::OciError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Tag(String),
    Digest(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Tag(t) => write!(f, ":{t}"),
            Locator::Digest(d) => write!(f, "@{d}"),
        }
    }
}

/// A fully parsed reference to an OCI artifact: registry host, repository
/// path, and either a tag or a content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciImageReference {
    pub host: String,
    pub repository: String,
    pub locator: Locator,
}

impl OciImageReference {
    pub fn parse(raw: &str) -> Result<Self, OciError> {
        let (before_locator, locator) = if let Some(idx) = raw.rfind('@') {
            (&raw[..idx], Locator::Digest(raw[idx + 1..].to_string()))
        } else if let Some(idx) = raw.rfind(':') {
            // Guard against a bare port in the host component, e.g.
            // `registry.example:5000/repo` with no tag.
            let after = &raw[idx + 1..];
            if after.contains('/') {
                (raw, Locator::Tag("latest".to_string()))
            } else {
                (&raw[..idx], Locator::Tag(after.to_string()))
            }
        } else {
            (raw, Locator::Tag("latest".to_string()))
        };

        let mut parts = before_locator.splitn(2, '/');
        let host = parts
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| OciError::InvalidReference(raw.to_string()))?
            .to_string();
        let repository = parts
            .next()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| OciError::InvalidReference(raw.to_string()))?
            .to_string();

        Ok(Self {
            host,
            repository,
            locator,
        })
    }

    /// Replaces the locator with a content digest, used when canonicalizing a
    /// tag reference to the digest it resolved to before replication.
    #[must_use]
    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            host: self.host.clone(),
            repository: self.repository.clone(),
            locator: Locator::Digest(digest.into()),
        }
    }

    #[must_use]
    pub fn blob_url(&self, digest: &str) -> String {
        format!(
            "https://{}/v2/{}/blobs/{}",
            self.host, self.repository, digest
        )
    }

    #[must_use]
    pub fn manifest_url(&self) -> String {
        format!(
            "https://{}/v2/{}/manifests/{}",
            self.host,
            self.repository,
            match &self.locator {
                Locator::Tag(t) => t.clone(),
                Locator::Digest(d) => d.clone(),
            }
        )
    }
}

impl fmt::Display for OciImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.host, self.repository, self.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_reference() {
        let r = OciImageReference::parse("registry.example/org/repo:1.2.3").unwrap();
        assert_eq!(r.host, "registry.example");
        assert_eq!(r.repository, "org/repo");
        assert_eq!(r.locator, Locator::Tag("1.2.3".to_string()));
    }

    #[test]
    fn parses_digest_reference() {
        let r = OciImageReference::parse("registry.example/org/repo@sha256:abc").unwrap();
        assert_eq!(r.locator, Locator::Digest("sha256:abc".to_string()));
    }

    #[test]
    fn defaults_to_latest_when_no_tag_given() {
        let r = OciImageReference::parse("registry.example/org/repo").unwrap();
        assert_eq!(r.locator, Locator::Tag("latest".to_string()));
    }

    #[test]
    fn host_with_port_is_not_mistaken_for_a_tag() {
        let r = OciImageReference::parse("registry.example:5000/org/repo:1.0").unwrap();
        assert_eq!(r.host, "registry.example:5000");
        assert_eq!(r.locator, Locator::Tag("1.0".to_string()));
    }

    #[test]
    fn rejects_reference_with_no_repository_path() {
        assert!(OciImageReference::parse("registry.example").is_err());
    }
}
