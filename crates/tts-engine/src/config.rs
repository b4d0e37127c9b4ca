use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct SynthesizeOpts {
    pub speed: f32,
    pub volume: f32,
    pub language: Option<String>,
}

impl SynthesizeOpts {
    pub fn new() -> Self {
        Self {
            speed: 1.0,
            volume: 1.0,
            language: None,
        }
    }
}

/// Immutable per-engine-instance snapshot (§3 `TTSConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub engine_type: String,
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_volume")]
    pub volume: f32,
    pub language: String,
    pub sample_rate: u32,
    pub model_dir: PathBuf,
    #[serde(default)]
    pub engine_params: HashMap<String, Value>,
}

fn default_speed() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiperVoiceConfig {
    pub id: String,
    pub model_path: PathBuf,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub preload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiperEngineConfig {
    #[serde(default = "default_piper_executable")]
    pub executable: PathBuf,
    pub voices: Vec<PiperVoiceConfig>,
}

fn default_piper_executable() -> PathBuf {
    PathBuf::from("piper")
}

#[derive(Debug, Clone, Deserialize)]
pub struct KokoroEngineConfig {
    pub model_path: PathBuf,
    pub voices_dir: PathBuf,
    #[serde(default = "default_kokoro_sample_rate")]
    pub sample_rate: u32,
    pub voices: Vec<String>,
    #[serde(default)]
    pub default_voice: Option<String>,
}

fn default_kokoro_sample_rate() -> u32 {
    24_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonosVoiceConfig {
    pub id: String,
    #[serde(default)]
    pub speaker_dir: Option<PathBuf>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub preload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonosEngineConfig {
    pub python_package_path: PathBuf,
    #[serde(default = "default_zonos_model_id")]
    pub model_id: String,
    #[serde(default = "default_zonos_speaker_dir")]
    pub speaker_dir: PathBuf,
    #[serde(default = "default_zonos_sample_rate")]
    pub sample_rate: u32,
    pub voices: Vec<ZonosVoiceConfig>,
}

fn default_zonos_model_id() -> String {
    "Zyphra/Zonos-v0.1-transformer".to_string()
}

fn default_zonos_speaker_dir() -> PathBuf {
    PathBuf::from("spk_cache")
}

fn default_zonos_sample_rate() -> u32 {
    48_000
}
