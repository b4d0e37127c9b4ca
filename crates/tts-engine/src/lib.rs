pub mod config;
pub mod engine_trait;
pub mod error;
pub mod kokoro;
pub mod lang;
pub mod piper;
pub mod result;
pub mod wav;
pub mod zonos;

pub use config::{
    KokoroEngineConfig, PiperEngineConfig, PiperVoiceConfig, SynthesizeOpts, TtsConfig,
    ZonosEngineConfig, ZonosVoiceConfig,
};
pub use engine_trait::{EngineInfo, TtsEngine};
pub use error::TtsEngineError;
pub use kokoro::KokoroEngine;
pub use lang::normalize_zonos_lang;
pub use piper::PiperEngine;
pub use result::{AudioFormat, TtsResult};
pub use wav::{decode_wav_pcm16, encode_wav_pcm16};
pub use zonos::ZonosEngine;
