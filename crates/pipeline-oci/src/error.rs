use thiserror::Error;

#[derive(Debug, Error)]
pub enum OciError {
    #[error("invalid OCI image reference {0:?}")]
    InvalidReference(String),

    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("registry returned unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to parse manifest JSON: {0}")]
    ManifestParse(#[from] serde_json::Error),

    #[error("manifest list nesting exceeded maximum depth of {max_depth}")]
    ManifestListTooDeep { max_depth: u32 },

    #[error("manifest has no schemaVersion 1 history to synthesize a config blob from")]
    MissingV1History,

    #[error("blob digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
