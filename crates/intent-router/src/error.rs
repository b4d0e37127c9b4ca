use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("external workflow request failed: {0}")]
    ExternalHttp(String),
    #[error("llm request failed: {0}")]
    LlmHttp(String),
}
