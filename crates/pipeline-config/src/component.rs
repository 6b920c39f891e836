//! Component-descriptor data model: identities, repository contexts, and the
//! descriptor document itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Uniquely identifies a component across the system. Both fields are
/// required; there is no "partial" identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub name: String,
    pub version: String,
}

impl ComponentIdentity {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// OCI repository paths only permit lowercase names.
    #[must_use]
    pub fn lowercase_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Parses `version` as semver, primarily to validate it; callers that only
    /// need ordering or comparisons should use the returned value directly.
    pub fn parsed_version(&self) -> Result<semver::Version, semver::Error> {
        semver::Version::parse(&self.version)
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A typed reference to an OCI-based artifact repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryContext {
    pub base_url: String,
}

impl RepositoryContext {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// `<base_url>/component-descriptors/<name>:<version>`
    #[must_use]
    pub fn component_descriptor_oci_ref(&self, identity: &ComponentIdentity) -> String {
        format!(
            "{}/component-descriptors/{}:{}",
            self.base_url.trim_end_matches('/'),
            identity.lowercase_name(),
            identity.version,
        )
    }

    /// Filesystem-cache-safe form of the base URL (`/` -> `-`).
    #[must_use]
    pub fn slug(&self) -> String {
        self.base_url.replace('/', "-")
    }
}

/// A declared source (git ref) of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub access_type: String,
    pub repo_url: String,
    pub commit: Option<String>,
}

/// A declared resource (artifact) of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub version: String,
    pub access_type: String,
    pub reference: String,
}

/// An outbound reference to another component, used by the upgrade-vector
/// detector and the cyclic-graph-safe reference iterator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReference {
    pub identity: ComponentIdentity,
}

/// A manifest listing a component, its resources, sources, and outbound
/// component-references, plus the chain of repository contexts it has
/// traversed (most recent last).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub identity: ComponentIdentity,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub component_references: Vec<ComponentReference>,
    #[serde(default)]
    pub repository_contexts: Vec<RepositoryContext>,
}

impl ComponentDescriptor {
    /// The repository context this descriptor was last retrieved from, if any
    /// — used by cache layers to decide where a write-back should land.
    #[must_use]
    pub fn current_repository_context(&self) -> Option<&RepositoryContext> {
        self.repository_contexts.last()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}

/// A proposed version bump for a single component, produced by
/// dependency-upgrade detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeVector {
    pub whence: ComponentIdentity,
    pub whither: ComponentIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oci_ref_is_lowercased_and_slashed() {
        let ctx = RepositoryContext::new("https://example.invalid/Ocm-Repo");
        let id = ComponentIdentity::new("Example/Component", "1.2.3");
        assert_eq!(
            ctx.component_descriptor_oci_ref(&id),
            "https://example.invalid/Ocm-Repo/component-descriptors/example/component:1.2.3"
        );
    }

    #[test]
    fn slug_replaces_slashes() {
        let ctx = RepositoryContext::new("https://example.invalid/a/b");
        assert_eq!(ctx.slug(), "https:--example.invalid-a-b");
    }

    #[test]
    fn current_repository_context_is_the_last_one() {
        let mut d = ComponentDescriptor {
            identity: ComponentIdentity::new("c", "1.0.0"),
            resources: vec![],
            sources: vec![],
            component_references: vec![],
            repository_contexts: vec![],
        };
        assert!(d.current_repository_context().is_none());
        d.repository_contexts.push(RepositoryContext::new("https://a"));
        d.repository_contexts.push(RepositoryContext::new("https://b"));
        assert_eq!(d.current_repository_context().unwrap().base_url, "https://b");
    }
}
