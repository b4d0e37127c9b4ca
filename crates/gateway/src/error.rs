//! Gateway-local error type (§7, §10.2).
//!
//! Lower crates each define their own `thiserror` enum at their boundary;
//! this one exists for failures that originate in the gateway binary itself
//! (auth, transport wiring) and carries enough information for the session
//! handler to translate it into a wire `{type:"error", code, message}` or a
//! close code without inspecting strings.

use thiserror::Error;
use voice_protocol::{CloseCode, ErrorCode};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("handshake did not start with hello")]
    BadHandshake,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("unknown stream id")]
    StreamUnknown,
    #[error(transparent)]
    Frame(#[from] voice_protocol::FrameError),
}

impl GatewayError {
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            GatewayError::BadHandshake => ErrorCode::BadHandshake,
            GatewayError::Unauthorized => ErrorCode::Unauthorized,
            GatewayError::InvalidJson(_) => ErrorCode::InvalidJson,
            GatewayError::StreamUnknown => ErrorCode::StreamUnknown,
            GatewayError::Frame(_) => ErrorCode::AudioFrameInvalid,
        }
    }

    /// Whether this failure should terminate the connection rather than
    /// just surface an `error` message and keep reading (§7).
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            GatewayError::BadHandshake => Some(CloseCode::BadHandshake),
            GatewayError::Unauthorized => Some(CloseCode::Unauthorized),
            _ => None,
        }
    }
}
