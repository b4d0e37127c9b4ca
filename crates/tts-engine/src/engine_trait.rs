use async_trait::async_trait;
use serde::Serialize;
use voice_registry::EngineKind;

use crate::config::SynthesizeOpts;
use crate::error::TtsEngineError;
use crate::result::TtsResult;

#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub kind: EngineKind,
    pub native_sample_rate: u32,
    pub available: bool,
    pub unavailable_reason: Option<String>,
}

/// Common contract implemented by every concrete TTS adapter (§4.3).
#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn initialize(&self) -> Result<(), TtsEngineError>;

    /// Renders `text` to PCM16 mono WAV. `voice` overrides the engine's
    /// configured default when present. Implementations must return a
    /// `sample_rate` matching the bytes and must not panic on cancellation —
    /// callers wrap this in a timeout and simply drop the future.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        opts: &SynthesizeOpts,
    ) -> Result<TtsResult, TtsEngineError>;

    fn supported_voices(&self) -> Vec<String>;

    fn engine_info(&self) -> EngineInfo;

    fn native_sample_rate(&self) -> u32;
}
