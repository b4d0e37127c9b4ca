pub mod control;
pub mod error;
pub mod frame;

pub use control::{InboundEnvelope, ServerMessage};
pub use error::{CloseCode, ErrorCode};
pub use frame::{AudioFrame, FrameError};

/// Handshake timeout, per spec §5.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;
