use thiserror::Error;

/// Errors surfaced by a single [`crate::layer::ComponentDescriptorLayer`] or by the
/// composite lookup that walks them.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("component descriptor {0} not found in any configured layer")]
    NotFound(String),

    #[error("no repository-context mapping matched component {0:?}")]
    NoMatchingRepositoryMapping(String),

    #[error("a repository-context mapping and an explicit default context were both supplied")]
    MappingAndDefaultContextConflict,

    #[error("failed to read cache file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize component descriptor: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("delivery-service request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("delivery-service returned status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to serialize manifest: {0}")]
    ManifestSerialize(#[from] serde_json::Error),

    #[error(transparent)]
    Oci(#[from] pipeline_oci::OciError),
}
