//! JSON control-message envelope and the payload shapes exchanged over the
//! WebSocket's text-frame channel.
//!
//! Inbound messages may carry either an `op` or a legacy `type` field as the
//! discriminator; outbound messages always set both to the same value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// Inbound envelope: discriminant plus the raw payload object, deferred
/// typed parsing is done by the caller once the op/type is known.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(flatten)]
    pub payload: Value,
}

impl InboundEnvelope {
    pub fn discriminant(&self) -> Option<&str> {
        self.op.as_deref().or(self.type_.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloFeatures {
    #[serde(default)]
    pub binary_audio: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloRequest {
    #[serde(default)]
    pub features: HelloFeatures,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAudioStreamRequest {
    #[serde(default)]
    pub tts_engine: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default)]
    pub tts_speed: Option<f32>,
    #[serde(default)]
    pub tts_volume: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioChunkRequest {
    pub stream_id: String,
    pub sequence: u32,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub is_binary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndAudioStreamRequest {
    pub stream_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextRequest {
    pub content: String,
    #[serde(default)]
    pub tts_engine: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default)]
    pub tts_speed: Option<f32>,
    #[serde(default)]
    pub tts_volume: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchTtsEngineRequest {
    pub engine: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTtsVoiceRequest {
    pub voice: String,
    #[serde(default)]
    pub engine: Option<String>,
}

fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Server-originated messages. Serializes with both `op` and `type` set to
/// the same discriminant for client compatibility.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Ready {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        features: Value,
    },
    AudioStreamStarted {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        stream_id: String,
        timestamp: f64,
    },
    AudioStreamEnded {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        stream_id: String,
        success: bool,
        timestamp: f64,
    },
    AudioStreamError {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        stream_id: String,
        code: ErrorCode,
        message: String,
    },
    Response {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        transcription: String,
    },
    TtsEngineSwitched {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        engine: String,
    },
    TtsSwitchError {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        message: String,
    },
    TtsVoiceChanged {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        voice: String,
        engine: Option<String>,
    },
    TtsVoiceError {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        message: String,
    },
    TtsInfo {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        available_engines: Vec<String>,
        available_voices: Vec<String>,
        current_engine: String,
        engine_stats: Value,
        switching_enabled: bool,
    },
    StagedTtsChunk {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        sequence_id: String,
        index: u32,
        total: u32,
        engine: String,
        sample_rate: u32,
        format: &'static str,
        pcm: String,
        crossfade_ms: u32,
    },
    StagedTtsSequenceEnd {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
        sequence_id: String,
        timestamp: f64,
    },
    Pong {
        op: &'static str,
        #[serde(rename = "type")]
        type_: &'static str,
    },
    Error {
        #[serde(rename = "type")]
        type_: &'static str,
        code: ErrorCode,
        message: String,
        timestamp: f64,
    },
}

impl ServerMessage {
    pub fn ready() -> Self {
        ServerMessage::Ready {
            op: "ready",
            type_: "ready",
            features: serde_json::json!({ "binary_audio": true }),
        }
    }

    pub fn audio_stream_started(stream_id: impl Into<String>) -> Self {
        ServerMessage::AudioStreamStarted {
            op: "audio_stream_started",
            type_: "audio_stream_started",
            stream_id: stream_id.into(),
            timestamp: now_ts(),
        }
    }

    pub fn audio_stream_ended(stream_id: impl Into<String>, success: bool) -> Self {
        ServerMessage::AudioStreamEnded {
            op: "audio_stream_ended",
            type_: "audio_stream_ended",
            stream_id: stream_id.into(),
            success,
            timestamp: now_ts(),
        }
    }

    pub fn audio_stream_error(
        stream_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        ServerMessage::AudioStreamError {
            op: "audio_stream_error",
            type_: "audio_stream_error",
            stream_id: stream_id.into(),
            code,
            message: message.into(),
        }
    }

    pub fn response(transcription: impl Into<String>) -> Self {
        ServerMessage::Response {
            op: "response",
            type_: "response",
            transcription: transcription.into(),
        }
    }

    pub fn staged_tts_chunk(
        sequence_id: impl Into<String>,
        index: u32,
        total: u32,
        engine: impl Into<String>,
        sample_rate: u32,
        format: &'static str,
        pcm: String,
        crossfade_ms: u32,
    ) -> Self {
        ServerMessage::StagedTtsChunk {
            op: "staged_tts_chunk",
            type_: "staged_tts_chunk",
            sequence_id: sequence_id.into(),
            index,
            total,
            engine: engine.into(),
            sample_rate,
            format,
            pcm,
            crossfade_ms,
        }
    }

    pub fn staged_tts_sequence_end(sequence_id: impl Into<String>) -> Self {
        ServerMessage::StagedTtsSequenceEnd {
            op: "staged_tts_sequence_end",
            type_: "staged_tts_sequence_end",
            sequence_id: sequence_id.into(),
            timestamp: now_ts(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            op: "pong",
            type_: "pong",
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            type_: "error",
            code,
            message: message.into(),
            timestamp: now_ts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_prefers_op_over_type() {
        let raw = serde_json::json!({ "op": "hello", "type": "ignored", "features": {} });
        let env: InboundEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.discriminant(), Some("hello"));
    }

    #[test]
    fn envelope_falls_back_to_legacy_type() {
        let raw = serde_json::json!({ "type": "hello", "features": {} });
        let env: InboundEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.discriminant(), Some("hello"));
    }

    #[test]
    fn ready_message_sets_both_discriminants() {
        let msg = ServerMessage::ready();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["op"], "ready");
        assert_eq!(value["type"], "ready");
        assert_eq!(value["features"]["binary_audio"], true);
    }

    #[test]
    fn error_message_shape() {
        let msg = ServerMessage::error(ErrorCode::AudioFrameInvalid, "too short");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "audio_frame_invalid");
        assert_eq!(value["message"], "too short");
    }
}
