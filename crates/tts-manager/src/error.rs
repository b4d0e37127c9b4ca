use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsManagerError {
    #[error("no tts engine available")]
    NoEngineAvailable,
    #[error("engine '{0}' is not registered or failed to initialize")]
    EngineUnavailable(String),
    #[error("voice '{0}' is not registered")]
    VoiceNotFound(String),
    #[error("voice '{voice}' is not bound to engine '{engine}'")]
    VoiceEngineMismatch { voice: String, engine: String },
    #[error(transparent)]
    Engine(#[from] tts_engine::TtsEngineError),
}
