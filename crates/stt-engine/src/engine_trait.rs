use async_trait::async_trait;

use crate::error::SttEngineError;

/// Per-chunk streaming result (§4.8's optional `process_binary_audio` path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTranscript {
    pub text: String,
}

/// Common contract implemented by every STT adapter. The core ships only
/// [`crate::DummySttEngine`]; real model loading/inference is out of scope.
#[async_trait]
pub trait SttEngine: Send + Sync {
    /// May fetch or convert a model on first use; implementations should
    /// tolerate common repo naming mismatches by falling back to the
    /// converted counterpart rather than failing outright.
    async fn initialize(&self) -> Result<(), SttEngineError>;

    /// Transcribes a full utterance. `pcm16_bytes` is little-endian mono
    /// PCM16; implementations normalize to float32 `[-1,1]` internally.
    async fn transcribe(
        &self,
        pcm16_bytes: &[u8],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<String, SttEngineError>;

    /// Per-chunk streaming path. Default implementation falls back to
    /// buffering nothing and transcribing the chunk in isolation; engines
    /// that support true incremental decoding should override this and must
    /// not buffer the entire utterance themselves.
    async fn process_binary_audio(
        &self,
        bytes: &[u8],
        sample_rate: u32,
        _stream_id: &str,
        _sequence: u32,
    ) -> Result<ChunkTranscript, SttEngineError> {
        let text = self.transcribe(bytes, sample_rate, None).await?;
        Ok(ChunkTranscript { text })
    }
}

/// Normalizes little-endian PCM16 bytes to float32 samples in `[-1, 1]`.
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>, SttEngineError> {
    if bytes.len() % 2 != 0 {
        return Err(SttEngineError::InvalidPcmLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}
