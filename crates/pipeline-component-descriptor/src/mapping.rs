//! Repository-context mapping: when a component name should be looked up in one
//! of several candidate OCM repositories rather than a single default context.

use pipeline_config::{ComponentIdentity, RepositoryContext};
use serde::{Deserialize, Serialize};

/// One candidate repository, optionally restricted to component names matching a
/// prefix. An empty `name_prefix` matches every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMappingEntry {
    #[serde(default)]
    pub name_prefix: String,
    pub repository_context: RepositoryContext,
}

/// An ordered set of candidate repository contexts. The lookup composite walks
/// them in declaration order; the first whose prefix matches the component wins.
/// Mutually exclusive with an explicit default context (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryMappingConfig {
    pub entries: Vec<RepositoryMappingEntry>,
}

impl RepositoryMappingConfig {
    /// Yields every repository context whose prefix matches `identity`, in
    /// declaration order.
    pub fn iter_candidates<'a>(
        &'a self,
        identity: &'a ComponentIdentity,
    ) -> impl Iterator<Item = &'a RepositoryContext> + 'a {
        self.entries
            .iter()
            .filter(move |e| identity.name.starts_with(&e.name_prefix))
            .map(|e| &e.repository_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_filtered_by_prefix_in_order() {
        let cfg = RepositoryMappingConfig {
            entries: vec![
                RepositoryMappingEntry {
                    name_prefix: "github.com/acme/".to_string(),
                    repository_context: RepositoryContext::new("https://acme.example/ocm"),
                },
                RepositoryMappingEntry {
                    name_prefix: String::new(),
                    repository_context: RepositoryContext::new("https://default.example/ocm"),
                },
            ],
        };
        let id = ComponentIdentity::new("github.com/acme/widget", "1.0.0");
        let candidates: Vec<_> = cfg.iter_candidates(&id).collect();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].base_url, "https://acme.example/ocm");

        let other = ComponentIdentity::new("github.com/other/widget", "1.0.0");
        let candidates: Vec<_> = cfg.iter_candidates(&other).collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].base_url, "https://default.example/ocm");
    }
}
