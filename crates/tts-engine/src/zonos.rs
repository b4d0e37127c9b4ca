use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use numpy::{PyArray1, PyReadonlyArray1};
use parking_lot::{Mutex, RwLock};
use pyo3::types::{PyDict, PyModule};
use pyo3::{Py, PyAny, Python};
use tracing::{debug, info, instrument};
use voice_registry::EngineKind;

use crate::config::{SynthesizeOpts, ZonosEngineConfig};
use crate::engine_trait::{EngineInfo, TtsEngine};
use crate::error::TtsEngineError;
use crate::lang::normalize_zonos_lang;
use crate::result::TtsResult;

fn ensure_python_path(path: &Path) {
    let existing = std::env::var_os("PYTHONPATH").unwrap_or_default();
    let mut entries: Vec<PathBuf> = std::env::split_paths(&existing).collect();
    let os_path = path.to_path_buf();
    if entries.iter().any(|p| p == &os_path) {
        return;
    }
    entries.insert(0, os_path.clone());
    let joined = std::env::join_paths(entries).expect("failed to construct PYTHONPATH");
    std::env::set_var("PYTHONPATH", joined);
}

#[derive(Clone)]
struct ZonosVoice {
    id: String,
    speaker_dir: Option<PathBuf>,
    language: Option<String>,
}

struct ZonosRuntime {
    engine: Py<PyAny>,
}

struct EngineInner {
    runtime: Mutex<ZonosRuntime>,
    voices: RwLock<HashMap<String, ZonosVoice>>,
    speaker_cache: Mutex<HashMap<String, Py<PyAny>>>,
    speaker_dir: PathBuf,
    sample_rate: u32,
}

/// Bridges to a Python `Zonos` generative model through pyo3, one GIL-serialized
/// runtime per process (§4.3). Speaker embeddings are cached per resolved
/// voice so repeat requests skip re-encoding the reference clip.
#[derive(Clone)]
pub struct ZonosEngine {
    inner: Arc<EngineInner>,
}

impl ZonosEngine {
    pub fn new(config: ZonosEngineConfig) -> Result<Self, TtsEngineError> {
        let python_package_path = config
            .python_package_path
            .canonicalize()
            .map_err(TtsEngineError::Io)?;
        ensure_python_path(&python_package_path);

        if config.voices.is_empty() {
            return Err(TtsEngineError::EngineUnavailable(
                "zonos: no voices configured".to_string(),
            ));
        }

        let mut voices = HashMap::new();
        for voice in &config.voices {
            voices.insert(
                voice.id.clone(),
                ZonosVoice {
                    id: voice.id.clone(),
                    speaker_dir: voice.speaker_dir.clone(),
                    language: voice.language.clone(),
                },
            );
        }

        let model_id = config.model_id.clone();
        let runtime = Python::with_gil(|py| -> Result<ZonosRuntime, pyo3::PyErr> {
            let module = PyModule::import(py, "zonos.model")?;
            let cls = module.getattr("Zonos")?;
            let from_pretrained = cls.getattr("from_pretrained")?;
            let engine = from_pretrained.call1((model_id.as_str(),))?.into_py(py);
            Ok(ZonosRuntime { engine })
        })
        .map_err(TtsEngineError::Python)?;

        info!(
            target = "voxgate::tts_engine",
            model = %config.model_id,
            voice_count = voices.len(),
            "initialized Zonos runtime"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                runtime: Mutex::new(runtime),
                voices: RwLock::new(voices),
                speaker_cache: Mutex::new(HashMap::new()),
                speaker_dir: config.speaker_dir,
                sample_rate: config.sample_rate,
            }),
        })
    }
}

impl EngineInner {
    /// Resolves `spk_cache/<voice>.*` case-insensitively, matching the
    /// original's directory scan rather than a fixed extension.
    fn resolve_speaker_path(&self, voice: &ZonosVoice) -> Result<PathBuf, TtsEngineError> {
        let dir = voice.speaker_dir.clone().unwrap_or_else(|| self.speaker_dir.clone());
        let target = voice.id.to_ascii_lowercase();
        let entries = std::fs::read_dir(&dir).map_err(TtsEngineError::Io)?;
        for entry in entries {
            let entry = entry.map_err(TtsEngineError::Io)?;
            let stem = entry.path().file_stem().map(|s| s.to_string_lossy().to_ascii_lowercase());
            if stem.as_deref() == Some(target.as_str()) {
                return Ok(entry.path());
            }
        }
        Err(TtsEngineError::VoiceNotFound(format!(
            "zonos: no speaker embedding found for {} in {}",
            voice.id,
            dir.display()
        )))
    }

    fn speaker_embedding(&self, voice: &ZonosVoice) -> Result<Py<PyAny>, TtsEngineError> {
        {
            let cache = self.speaker_cache.lock();
            if let Some(embedding) = cache.get(&voice.id) {
                return Python::with_gil(|py| Ok(embedding.clone_ref(py)));
            }
        }

        let speaker_path = self.resolve_speaker_path(voice)?;
        let runtime = self.runtime.lock();
        let embedding = Python::with_gil(|py| -> Result<Py<PyAny>, pyo3::PyErr> {
            let engine = runtime.engine.as_ref(py);
            let make_embedding = engine.getattr("make_speaker_embedding")?;
            let embedding = make_embedding.call1((speaker_path.as_os_str(),))?;
            Ok(embedding.into_py(py))
        })
        .map_err(TtsEngineError::Python)?;

        let mut cache = self.speaker_cache.lock();
        let stored = Python::with_gil(|py| embedding.clone_ref(py));
        cache.insert(voice.id.clone(), embedding);
        Ok(stored)
    }

    fn synthesize_blocking(
        &self,
        text: &str,
        voice: ZonosVoice,
        speed: f32,
        lang: &str,
    ) -> Result<(Vec<f32>, u32), TtsEngineError> {
        let speaker_embedding = self.speaker_embedding(&voice)?;
        let runtime = self.runtime.lock();

        Python::with_gil(|py| -> Result<(Vec<f32>, u32), TtsEngineError> {
            let engine = runtime.engine.as_ref(py);
            let generate = engine.getattr("generate").map_err(TtsEngineError::Python)?;

            let kwargs = PyDict::new(py);
            kwargs.set_item("speaker", speaker_embedding.as_ref(py)).map_err(TtsEngineError::Python)?;
            kwargs.set_item("language", lang).map_err(TtsEngineError::Python)?;
            kwargs.set_item("speaking_rate", speed).map_err(TtsEngineError::Python)?;

            let result = generate
                .call((text,), Some(kwargs))
                .map_err(TtsEngineError::Python)?;
            let tuple: (Py<PyAny>, u32) = result.extract().map_err(TtsEngineError::Python)?;
            let (wav_array, sr) = tuple;

            let bound = wav_array.bind(py);
            if let Ok(array_f32) = bound.downcast::<PyArray1<f32>>() {
                let readonly: PyReadonlyArray1<f32> = array_f32.readonly();
                let waveform = readonly.as_slice().map_err(TtsEngineError::Python)?.to_vec();
                return Ok((waveform, sr));
            }
            if let Ok(array_f64) = bound.downcast::<PyArray1<f64>>() {
                let readonly: PyReadonlyArray1<f64> = array_f64.readonly();
                let waveform = readonly
                    .as_slice()
                    .map_err(TtsEngineError::Python)?
                    .iter()
                    .map(|&s| s as f32)
                    .collect();
                return Ok((waveform, sr));
            }

            Err(TtsEngineError::Synthesis(
                "zonos: unsupported waveform dtype, expected float32 or float64".to_string(),
            ))
        })
    }
}

#[async_trait]
impl TtsEngine for ZonosEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Zonos
    }

    async fn initialize(&self) -> Result<(), TtsEngineError> {
        Ok(())
    }

    #[instrument(skip(self, text, opts), fields(engine = "zonos"))]
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        opts: &SynthesizeOpts,
    ) -> Result<TtsResult, TtsEngineError> {
        let started = Instant::now();
        let sanitized = voice_registry::pre_clean_for_tts(text);

        let voice_entry = {
            let voices = self.inner.voices.read();
            let voice_id = voice
                .map(str::to_string)
                .or_else(|| voices.keys().next().cloned())
                .ok_or_else(|| TtsEngineError::VoiceNotFound("zonos: no voices available".to_string()))?;
            voices
                .get(&voice_id)
                .cloned()
                .ok_or_else(|| TtsEngineError::VoiceNotFound(voice_id))?
        };

        let lang = normalize_zonos_lang(opts.language.as_deref().or(voice_entry.language.as_deref()))?;
        let speed = opts.speed;
        let voice_id = voice_entry.id.clone();
        let sample_rate_hint = self.inner.sample_rate;
        let inner = self.inner.clone();

        let (samples, sample_rate) = tokio::task::spawn_blocking(move || {
            inner.synthesize_blocking(&sanitized, voice_entry, speed, lang)
        })
        .await
        .map_err(|e| TtsEngineError::Synthesis(format!("zonos join error: {e}")))??;

        let sample_rate = if sample_rate == 0 { sample_rate_hint } else { sample_rate };
        let audio_data = crate::wav::encode_wav_pcm16(&samples, sample_rate)?;

        debug!(voice = %voice_id, lang, samples = samples.len(), "zonos synthesis complete");

        Ok(TtsResult::ok(
            audio_data,
            sample_rate,
            "zonos",
            voice_id,
            started.elapsed().as_secs_f64() * 1000.0,
        ))
    }

    fn supported_voices(&self) -> Vec<String> {
        self.inner.voices.read().keys().cloned().collect()
    }

    fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            kind: EngineKind::Zonos,
            native_sample_rate: self.inner.sample_rate,
            available: !self.inner.voices.read().is_empty(),
            unavailable_reason: None,
        }
    }

    fn native_sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }
}
