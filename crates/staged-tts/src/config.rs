use voice_registry::EngineKind;

/// Env-driven policy for one staged synthesis pass (§4.5).
#[derive(Debug, Clone)]
pub struct StagedTtsPolicy {
    pub intro_engine: EngineKind,
    pub main_engine: EngineKind,
    pub max_intro_length: usize,
    pub intro_timeout_ms: u64,
    pub main_timeout_ms: u64,
    pub crossfade_ms: u64,
    pub first_call_factor: f64,
    pub target_sample_rate: Option<u32>,
    pub max_chunks: usize,
    pub enable_caching: bool,
    pub cache_size: usize,
    pub ignore_voice_caps: bool,
}

impl Default for StagedTtsPolicy {
    fn default() -> Self {
        Self {
            intro_engine: EngineKind::Piper,
            main_engine: EngineKind::Zonos,
            max_intro_length: 150,
            intro_timeout_ms: 2_000,
            main_timeout_ms: 6_000,
            crossfade_ms: 100,
            first_call_factor: 2.0,
            target_sample_rate: Some(24_000),
            max_chunks: 8,
            enable_caching: false,
            cache_size: 64,
            ignore_voice_caps: false,
        }
    }
}

impl StagedTtsPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            intro_engine: env_engine("STAGED_TTS_INTRO_ENGINE", defaults.intro_engine),
            main_engine: env_engine("STAGED_TTS_MAIN_ENGINE", defaults.main_engine),
            max_intro_length: env_usize("STAGED_TTS_MAX_INTRO_LENGTH", defaults.max_intro_length),
            intro_timeout_ms: env_u64("STAGED_TTS_INTRO_TIMEOUT_MS", defaults.intro_timeout_ms).max(1),
            main_timeout_ms: env_u64("STAGED_TTS_MAIN_TIMEOUT_MS", defaults.main_timeout_ms).max(1),
            crossfade_ms: env_u64("STAGED_TTS_CROSSFADE_MS", defaults.crossfade_ms),
            first_call_factor: env_f64("STAGED_TTS_FIRST_CALL_FACTOR", defaults.first_call_factor),
            target_sample_rate: Some(env_u64("TTS_TARGET_SR", 24_000) as u32).filter(|&sr| sr > 0),
            max_chunks: env_usize("STAGED_TTS_MAX_CHUNKS", defaults.max_chunks),
            enable_caching: env_bool("STAGED_TTS_ENABLE_CACHING", defaults.enable_caching),
            cache_size: env_usize("STAGED_TTS_CACHE_SIZE", defaults.cache_size),
            ignore_voice_caps: env_bool("STAGED_TTS_IGNORE_VOICE_CAPS", defaults.ignore_voice_caps),
        }
    }
}

fn env_engine(key: &str, fallback: EngineKind) -> EngineKind {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn env_usize(key: &str, fallback: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_f64(key: &str, fallback: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

fn env_bool(key: &str, fallback: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(fallback)
}
