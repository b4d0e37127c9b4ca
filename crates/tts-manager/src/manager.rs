use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};
use voice_registry::{EngineKind, VoiceAliasRegistry};

use tts_engine::{SynthesizeOpts, TtsEngine, TtsResult};

use crate::error::TtsManagerError;
use crate::stats::{EngineStats, EngineStatsTracker};

/// Owns every configured engine instance, the voice-to-engine gate, and the
/// dispatch precedence between an explicit request, a voice-bound default,
/// and the manager-wide default (§4.4).
pub struct TtsManager {
    engines: HashMap<EngineKind, Arc<dyn TtsEngine>>,
    unavailable: HashMap<EngineKind, String>,
    stats: HashMap<EngineKind, EngineStatsTracker>,
    default_engine: RwLock<Option<EngineKind>>,
    voices: Arc<VoiceAliasRegistry>,
    limiter: Arc<Semaphore>,
    ignore_voice_caps: bool,
}

impl TtsManager {
    /// Initializes every candidate engine; at least one must succeed. Failed
    /// engines are recorded with their reason rather than dropped silently.
    pub async fn initialize(
        candidates: Vec<Arc<dyn TtsEngine>>,
        voices: Arc<VoiceAliasRegistry>,
        max_parallel: usize,
        ignore_voice_caps: bool,
        preferred_default: Option<EngineKind>,
    ) -> Result<Self, TtsManagerError> {
        let mut engines = HashMap::new();
        let mut unavailable = HashMap::new();
        let mut stats = HashMap::new();

        for engine in candidates {
            let kind = engine.kind();
            match engine.initialize().await {
                Ok(()) => {
                    stats.insert(kind, EngineStatsTracker::default());
                    engines.insert(kind, engine);
                }
                Err(e) => {
                    warn!(engine = %kind, error = %e, "tts engine failed to initialize");
                    unavailable.insert(kind, e.to_string());
                }
            }
        }

        if engines.is_empty() {
            return Err(TtsManagerError::NoEngineAvailable);
        }

        let default_engine = preferred_default
            .filter(|k| engines.contains_key(k))
            .or_else(|| Some(EngineKind::Zonos).filter(|k| engines.contains_key(k)))
            .or_else(|| engines.keys().next().copied());

        Ok(Self {
            engines,
            unavailable,
            stats,
            default_engine: RwLock::new(default_engine),
            voices,
            limiter: Arc::new(Semaphore::new(max_parallel.max(1))),
            ignore_voice_caps,
        })
    }

    pub fn switch_engine(&self, engine: EngineKind) -> Result<(), TtsManagerError> {
        if !self.engines.contains_key(&engine) {
            return Err(TtsManagerError::EngineUnavailable(engine.to_string()));
        }
        *self.default_engine.write() = Some(engine);
        Ok(())
    }

    pub fn default_engine(&self) -> Option<EngineKind> {
        *self.default_engine.read()
    }

    pub fn engine_allowed_for_voice(&self, engine: EngineKind, voice: &str) -> bool {
        if self.ignore_voice_caps {
            return true;
        }
        self.voices.resolve(voice, engine).is_some()
    }

    #[instrument(skip(self, text, opts))]
    pub async fn synthesize(
        &self,
        text: &str,
        engine: Option<EngineKind>,
        voice: Option<&str>,
        opts: &SynthesizeOpts,
    ) -> Result<TtsResult, TtsManagerError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("tts-manager semaphore closed unexpectedly");

        let sanitized = voice_registry::pre_clean_for_tts(text);
        let canonical_voice = voice.map(VoiceAliasRegistry::canonicalize);

        let resolved_engine = engine
            .or_else(|| {
                canonical_voice.as_deref().and_then(|v| {
                    self.voices
                        .engines_for(v)
                        .into_iter()
                        .find(|k| self.engines.contains_key(k))
                })
            })
            .or_else(|| self.default_engine())
            .ok_or(TtsManagerError::NoEngineAvailable)?;

        if let Some(ref voice_id) = canonical_voice {
            if !self.engine_allowed_for_voice(resolved_engine, voice_id) {
                return Err(TtsManagerError::VoiceEngineMismatch {
                    voice: voice_id.clone(),
                    engine: resolved_engine.to_string(),
                });
            }
        }

        let engine_impl = self
            .engines
            .get(&resolved_engine)
            .ok_or_else(|| TtsManagerError::EngineUnavailable(resolved_engine.to_string()))?;

        let result = engine_impl
            .synthesize(&sanitized, canonical_voice.as_deref(), opts)
            .await;

        if let Some(tracker) = self.stats.get(&resolved_engine) {
            match &result {
                Ok(r) if r.success => tracker.record_success(r.processing_time_ms),
                _ => tracker.record_failure(),
            }
        }

        Ok(result?)
    }

    pub fn engine_stats(&self) -> HashMap<String, EngineStats> {
        self.stats
            .iter()
            .map(|(k, v)| (k.to_string(), v.snapshot()))
            .collect()
    }

    pub fn available_engines(&self) -> Vec<EngineKind> {
        self.engines.keys().copied().collect()
    }

    pub fn unavailable_engines(&self) -> HashMap<String, String> {
        self.unavailable
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn supported_voices(&self, engine: EngineKind) -> Vec<String> {
        self.engines
            .get(&engine)
            .map(|e| e.supported_voices())
            .unwrap_or_default()
    }
}
