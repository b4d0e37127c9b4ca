use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};
use voice_registry::EngineKind;

use crate::config::{PiperEngineConfig, SynthesizeOpts};
use crate::engine_trait::{EngineInfo, TtsEngine};
use crate::error::TtsEngineError;
use crate::result::TtsResult;

#[derive(Debug, Clone)]
struct PiperVoiceEntry {
    model_path: PathBuf,
    sample_rate: u32,
    language: String,
}

/// Shells out to the `piper` executable once per synthesis call. Piper loads
/// one ONNX model per voice and always emits PCM16 WAV; `sample_rate` is read
/// from the model's `<model>.onnx.json` sidecar (init fails if it is missing).
pub struct PiperEngine {
    executable: PathBuf,
    voices: RwLock<HashMap<String, PiperVoiceEntry>>,
}

impl PiperEngine {
    pub fn new(config: PiperEngineConfig) -> Result<Self, TtsEngineError> {
        let mut voices = HashMap::new();
        for voice in &config.voices {
            let sidecar_path = sidecar_path(&voice.model_path);
            let sidecar = std::fs::read_to_string(&sidecar_path).map_err(|e| {
                TtsEngineError::EngineUnavailable(format!(
                    "piper voice {}: missing sidecar metadata at {}: {e}",
                    voice.id,
                    sidecar_path.display()
                ))
            })?;
            let parsed: serde_json::Value = serde_json::from_str(&sidecar)?;
            let sample_rate = parsed
                .get("audio")
                .and_then(|a| a.get("sample_rate"))
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    TtsEngineError::EngineUnavailable(format!(
                        "piper voice {}: sidecar missing audio.sample_rate",
                        voice.id
                    ))
                })? as u32;

            voices.insert(
                voice.id.clone(),
                PiperVoiceEntry {
                    model_path: voice.model_path.clone(),
                    sample_rate,
                    language: voice.language.clone().unwrap_or_else(|| "de".to_string()),
                },
            );
        }

        if voices.is_empty() {
            return Err(TtsEngineError::EngineUnavailable(
                "piper: no voices configured".to_string(),
            ));
        }

        Ok(Self {
            executable: config.executable,
            voices: RwLock::new(voices),
        })
    }

    fn resolve_voice(&self, voice: Option<&str>) -> Result<(String, PiperVoiceEntry), TtsEngineError> {
        let voices = self.voices.read();
        let voice_id = voice
            .map(str::to_string)
            .or_else(|| voices.keys().next().cloned())
            .ok_or_else(|| TtsEngineError::VoiceNotFound("piper: no voices available".to_string()))?;
        let entry = voices
            .get(&voice_id)
            .cloned()
            .ok_or_else(|| TtsEngineError::VoiceNotFound(voice_id.clone()))?;
        Ok((voice_id, entry))
    }
}

fn sidecar_path(model_path: &std::path::Path) -> PathBuf {
    let mut s = model_path.as_os_str().to_owned();
    s.push(".json");
    PathBuf::from(s)
}

#[async_trait]
impl TtsEngine for PiperEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Piper
    }

    async fn initialize(&self) -> Result<(), TtsEngineError> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match output {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(TtsEngineError::EngineUnavailable(format!(
                "piper executable exited with {status}"
            ))),
            Err(e) => Err(TtsEngineError::EngineUnavailable(format!(
                "piper executable not runnable: {e}"
            ))),
        }
    }

    #[instrument(skip(self, text, opts), fields(engine = "piper"))]
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        opts: &SynthesizeOpts,
    ) -> Result<TtsResult, TtsEngineError> {
        let started = Instant::now();
        let sanitized = voice_registry::pre_clean_for_tts(text);
        let (voice_id, entry) = self.resolve_voice(voice)?;

        let out_dir = tokio::task::spawn_blocking(std::env::temp_dir)
            .await
            .map_err(|e| TtsEngineError::Synthesis(format!("temp dir join error: {e}")))?;
        let out_path = out_dir.join(format!("piper-{}.wav", uuid::Uuid::new_v4()));

        let mut child = Command::new(&self.executable)
            .arg("--model")
            .arg(&entry.model_path)
            .arg("--output_file")
            .arg(&out_path)
            .arg("--length_scale")
            .arg(format!("{}", (1.0 / opts.speed.max(0.01)) as f32))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(TtsEngineError::Io)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(sanitized.as_bytes()).await.map_err(TtsEngineError::Io)?;
        }

        let output = child.wait_with_output().await.map_err(TtsEngineError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(TtsEngineError::Synthesis(format!(
                "piper exited with {}: {}",
                output.status, stderr
            )));
        }

        let audio_data = tokio::fs::read(&out_path).await.map_err(TtsEngineError::Io)?;
        let _ = tokio::fs::remove_file(&out_path).await;

        debug!(
            voice = %voice_id,
            language = %entry.language,
            elapsed_ms = started.elapsed().as_millis(),
            "piper synthesis complete"
        );

        Ok(TtsResult::ok(
            audio_data,
            entry.sample_rate,
            "piper",
            voice_id,
            started.elapsed().as_secs_f64() * 1000.0,
        ))
    }

    fn supported_voices(&self) -> Vec<String> {
        self.voices.read().keys().cloned().collect()
    }

    fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            kind: EngineKind::Piper,
            native_sample_rate: self
                .voices
                .read()
                .values()
                .next()
                .map(|v| v.sample_rate)
                .unwrap_or(22_050),
            available: !self.voices.read().is_empty(),
            unavailable_reason: None,
        }
    }

    fn native_sample_rate(&self) -> u32 {
        self.voices
            .read()
            .values()
            .next()
            .map(|v| v.sample_rate)
            .unwrap_or(22_050)
    }
}

