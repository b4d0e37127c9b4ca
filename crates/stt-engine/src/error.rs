use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttEngineError {
    #[error("stt engine failed to initialize: {0}")]
    InitializationFailed(String),
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("pcm16 payload length {0} is not a multiple of 2")]
    InvalidPcmLength(usize),
}
