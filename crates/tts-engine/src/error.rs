use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsEngineError {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("voice not found: {0}")]
    VoiceNotFound(String),
    #[error("language not supported: {0}")]
    LanguageUnsupported(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("synthesis timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("python interpreter error: {0}")]
    Python(#[from] pyo3::PyErr),
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
