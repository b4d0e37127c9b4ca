pub mod buffer;
pub mod job;
pub mod manager;
pub mod vad;

pub use buffer::{AudioBuffer, AudioChunk};
pub use job::{FinalizedJob, JobProcessor};
pub use manager::{
    FinalizeError, PushError, PushOutcome, StreamManager, StreamManagerConfig, StreamStartOpts,
};
pub use vad::{VadConfig, VadProcessor, VadStats};
