#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("invalid command: {0}")]
    InvalidInput(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}
