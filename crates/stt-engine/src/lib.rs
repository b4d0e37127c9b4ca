pub mod config;
pub mod dummy;
pub mod engine_trait;
pub mod error;
pub mod pool;

pub use config::SttConfig;
pub use dummy::DummySttEngine;
pub use engine_trait::{pcm16_to_f32, ChunkTranscript, SttEngine};
pub use error::SttEngineError;
pub use pool::SttWorkerPool;
