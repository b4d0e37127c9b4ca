use async_trait::async_trait;

/// A finalized stream handed off to the orchestration layer (STT → route →
/// TTS). The stream manager itself never inspects these fields; it only
/// buffers, gates via VAD, and hands the drained bytes off (§4.9, mirroring
/// the reference's `on_text` callback seam).
#[derive(Debug, Clone)]
pub struct FinalizedJob {
    pub stream_id: String,
    pub client_id: String,
    pub pcm16: Vec<u8>,
    pub sample_rate: u32,
    pub tts_engine: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
    pub tts_volume: Option<f32>,
}

/// Implemented by the caller (the gateway binary) to run STT → route → TTS
/// for one finalized stream. The stream manager spawns one child task per
/// job and awaits this; a panic or long synthesis in one job never blocks
/// the worker loop from dequeuing the next.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: FinalizedJob);
}
