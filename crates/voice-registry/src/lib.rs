pub mod alias;
pub mod engine_kind;
pub mod sanitizer;

pub use alias::{EngineVoice, VoiceAliasRegistry};
pub use engine_kind::EngineKind;
pub use sanitizer::{pre_clean_for_tts, sanitize};
