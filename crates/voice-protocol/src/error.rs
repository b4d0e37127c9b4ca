//! Wire-level error codes and close codes shared by every session handler.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadHandshake,
    Unauthorized,
    InvalidJson,
    AudioFrameInvalid,
    PcmFrameInvalidLength,
    StreamUnknown,
    BufferOverflow,
    TtsNoEngine,
    TtsSynthesisFailed,
    VoiceEngineMismatch,
    EngineUnavailable,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "internal_error".to_string());
        write!(f, "{s}")
    }
}

/// Close codes used when terminating a WebSocket connection from the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Clean,
    ServerError,
    BadHandshake,
    Unauthorized,
    HandshakeTimeout,
}

impl CloseCode {
    pub const fn code(self) -> u16 {
        match self {
            CloseCode::Clean => 1000,
            CloseCode::ServerError => 1011,
            CloseCode::BadHandshake => 4400,
            CloseCode::Unauthorized => 4401,
            CloseCode::HandshakeTimeout => 4408,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_snake_case() {
        assert_eq!(ErrorCode::VoiceEngineMismatch.to_string(), "voice_engine_mismatch");
        assert_eq!(ErrorCode::TtsNoEngine.to_string(), "tts_no_engine");
    }

    #[test]
    fn close_codes_match_spec() {
        assert_eq!(CloseCode::Clean.code(), 1000);
        assert_eq!(CloseCode::ServerError.code(), 1011);
        assert_eq!(CloseCode::BadHandshake.code(), 4400);
        assert_eq!(CloseCode::Unauthorized.code(), 4401);
        assert_eq!(CloseCode::HandshakeTimeout.code(), 4408);
    }
}
