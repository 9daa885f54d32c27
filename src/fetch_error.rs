#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upstream API returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),
    #[error("Failed to parse upstream JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Upstream response missing field: {0}")]
    MissingField(&'static str),
    #[error("Failed to parse return-period value: {0}")]
    NumberError(String),
}
