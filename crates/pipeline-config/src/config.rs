//! Top-level configuration loaded at startup: plain `serde`-deserializable
//! structs, loaded from YAML on disk and overridable by environment
//! variables at the CLI layer.

use serde::{Deserialize, Serialize};

use crate::component::RepositoryContext;
use crate::pipeline::JobMapping;

/// Root configuration document for a `pipeline-sync` deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    pub webhook_dispatcher: WebhookDispatcherConfig,
    #[serde(default)]
    pub ci_backends: Vec<CiBackendConfig>,
    #[serde(default)]
    pub job_mappings: Vec<JobMapping>,
    pub component_descriptor: ComponentDescriptorConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default = "RootConfig::default_branch")]
    pub default_branch: String,
    #[serde(default = "RootConfig::default_hostname")]
    pub default_hostname: String,
}

impl RootConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Looks up a job mapping by its repository-scoped name (typically
    /// `org/repo` or `org/repo:branch`).
    #[must_use]
    pub fn job_mapping(&self, name: &str) -> Option<&JobMapping> {
        self.job_mappings.iter().find(|m| m.name == name)
    }

    fn default_branch() -> String {
        "main".to_string()
    }

    fn default_hostname() -> String {
        "github.com".to_string()
    }
}

/// Post-save pipeline state, applied uniformly across every configured CI
/// backend (`CiBackendDeployer::new`'s three flags).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub unpause_pipelines: bool,
    #[serde(default)]
    pub unpause_new_pipelines: bool,
    #[serde(default)]
    pub expose_pipelines: bool,
}

/// Listen address and GitHub webhook-secret verification settings for the
/// HTTP dispatcher endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDispatcherConfig {
    #[serde(default = "WebhookDispatcherConfig::default_bind_address")]
    pub bind_address: String,
    /// HMAC secret used to verify `X-Hub-Signature-256`. Loaded from the
    /// environment at the CLI layer, never committed to a config file.
    #[serde(skip)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

impl WebhookDispatcherConfig {
    fn default_bind_address() -> String {
        "0.0.0.0:8080".to_string()
    }
}

/// A single configured CI backend (Concourse-style target), identified by the
/// `backend_name` used in [`crate::pipeline::CiTargetKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiBackendConfig {
    pub backend_name: String,
    pub base_url: String,
    pub team_name: String,
    #[serde(skip)]
    pub auth_token: Option<String>,
}

/// Where component descriptors are looked up from and cached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptorConfig {
    pub repository_context: RepositoryContext,
    #[serde(default)]
    pub delivery_service_base_url: Option<String>,
    #[serde(default = "ComponentDescriptorConfig::default_filesystem_cache_dir")]
    pub filesystem_cache_dir: String,
    #[serde(default = "ComponentDescriptorConfig::default_in_memory_cache_size")]
    pub in_memory_cache_size: usize,
}

impl ComponentDescriptorConfig {
    fn default_filesystem_cache_dir() -> String {
        "/tmp/pipeline-sync/component-descriptor-cache".to_string()
    }

    fn default_in_memory_cache_size() -> usize {
        2048
    }
}

/// SMTP settings for the owner-notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender_address: String,
    #[serde(skip)]
    pub smtp_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let yaml = r#"
webhook_dispatcher: {}
component_descriptor:
  repository_context:
    base_url: https://example.invalid/ocm
"#;
        let cfg = RootConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.webhook_dispatcher.bind_address, "0.0.0.0:8080");
        assert_eq!(cfg.component_descriptor.in_memory_cache_size, 2048);
        assert!(cfg.job_mappings.is_empty());
    }

    #[test]
    fn job_mapping_lookup_by_name() {
        let yaml = r#"
webhook_dispatcher: {}
component_descriptor:
  repository_context:
    base_url: https://example.invalid/ocm
job_mappings:
  - name: org/repo
    ci_target:
      backend_name: main
      team_name: team-a
"#;
        let cfg = RootConfig::from_yaml(yaml).unwrap();
        assert!(cfg.job_mapping("org/repo").is_some());
        assert!(cfg.job_mapping("org/missing").is_none());
    }
}
