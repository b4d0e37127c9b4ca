pub mod error;
pub mod manager;
pub mod stats;

pub use error::TtsManagerError;
pub use manager::TtsManager;
pub use stats::{EngineStats, EngineStatsTracker};
