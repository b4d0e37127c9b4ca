pub mod cache;
pub mod config;
pub mod crossfade;
pub mod pipeline;
pub mod resample;

pub use cache::{CachedSegment, ChunkCache};
pub use config::StagedTtsPolicy;
pub use pipeline::StagedTtsPipeline;
