use thiserror::Error;

/// Errors surfaced while loading or validating configuration and data-model
/// values. Parsing/IO details are wrapped rather than flattened so callers
/// can match on the failure category without string-matching messages.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("job mapping {0:?} not found")]
    JobMappingNotFound(String),

    #[error("invalid component version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
}
