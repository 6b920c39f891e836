use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned status {status} for {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("failed to decode response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file contents were not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("file contents were not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
