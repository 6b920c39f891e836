use thiserror::Error;

#[derive(Debug, Error)]
pub enum CiBackendError {
    #[error("CI backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("CI backend returned status {status} for {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("CI backend returned an unrecognized set_pipeline result")]
    UnknownSetPipelineResult,

    #[error("pipeline {0:?} not found")]
    PipelineNotFound(String),

    #[error("failed to decode response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no CI backend configured for target {backend_name:?}/{team_name:?}")]
    NoSuchTarget {
        backend_name: String,
        team_name: String,
    },

    #[error("io error writing pipeline file: {0}")]
    Io(#[from] std::io::Error),
}
