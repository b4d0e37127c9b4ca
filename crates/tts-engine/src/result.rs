use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Wav,
    PcmF32,
    PcmS16,
}

/// Outcome of a single synthesis call (§3 `TTSResult`).
///
/// `audio_data`, when present, MUST be PCM16 mono WAV with a correct header
/// whose sample_rate matches [`TtsResult::sample_rate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsResult {
    pub success: bool,
    pub audio_data: Option<Vec<u8>>,
    pub sample_rate: u32,
    pub format: AudioFormat,
    pub engine_used: String,
    pub voice_used: String,
    pub processing_time_ms: f64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl TtsResult {
    pub fn ok(
        audio_data: Vec<u8>,
        sample_rate: u32,
        engine_used: impl Into<String>,
        voice_used: impl Into<String>,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            success: true,
            audio_data: Some(audio_data),
            sample_rate,
            format: AudioFormat::Wav,
            engine_used: engine_used.into(),
            voice_used: voice_used.into(),
            processing_time_ms,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(
        engine_used: impl Into<String>,
        voice_used: impl Into<String>,
        error_kind: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            audio_data: None,
            sample_rate: 0,
            format: AudioFormat::Wav,
            engine_used: engine_used.into(),
            voice_used: voice_used.into(),
            processing_time_ms: 0.0,
            error_kind: Some(error_kind.into()),
            error_message: Some(error_message.into()),
        }
    }
}
