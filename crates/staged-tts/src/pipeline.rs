use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use voice_protocol::{ErrorCode, ServerMessage};
use voice_registry::EngineKind;

use tts_engine::{decode_wav_pcm16, SynthesizeOpts};
use tts_manager::TtsManager;

use crate::cache::{CachedSegment, ChunkCache};
use crate::config::StagedTtsPolicy;
use crate::crossfade::to_pcm_s16;
use crate::resample::resample_mono;

struct Segment {
    samples: Vec<f32>,
    sample_rate: u32,
    engine: EngineKind,
}

/// Drives one staged synthesis sequence end to end: plan, synthesize intro
/// and main, resample, crossfade, and emit chunk messages (§4.5).
pub struct StagedTtsPipeline {
    manager: Arc<TtsManager>,
    policy: StagedTtsPolicy,
    cache: ChunkCache,
    zonos_warmed_up: AtomicBool,
}

impl StagedTtsPipeline {
    pub fn new(manager: Arc<TtsManager>, policy: StagedTtsPolicy) -> Self {
        let cache_size = policy.cache_size;
        Self {
            manager,
            policy,
            cache: ChunkCache::new(cache_size),
            zonos_warmed_up: AtomicBool::new(false),
        }
    }

    fn intro_engine_effective(&self, voice: Option<&str>) -> Option<EngineKind> {
        let engine = self.policy.intro_engine;
        if !self.manager.available_engines().contains(&engine) {
            return None;
        }
        if self.policy.ignore_voice_caps {
            return Some(engine);
        }
        match voice {
            Some(v) if !self.manager.engine_allowed_for_voice(engine, v) => None,
            _ => Some(engine),
        }
    }

    /// Fallback chain in priority order: the configured main engine first,
    /// then Piper. Duplicates (main engine already being Piper) are dropped
    /// without disturbing that order.
    fn main_engine_chain(&self, voice: Option<&str>) -> Vec<EngineKind> {
        let available = self.manager.available_engines();
        let mut seen = std::collections::HashSet::new();
        [self.policy.main_engine, EngineKind::Piper]
            .into_iter()
            .filter(|e| seen.insert(*e))
            .filter(|e| available.contains(e))
            .filter(|e| match voice {
                Some(v) if !self.policy.ignore_voice_caps => self.manager.engine_allowed_for_voice(*e, v),
                _ => true,
            })
            .collect()
    }

    async fn synthesize_segment(
        &self,
        text: &str,
        voice: Option<&str>,
        engine: EngineKind,
        timeout: Duration,
        opts: &SynthesizeOpts,
    ) -> Option<Segment> {
        let cache_key = if self.policy.enable_caching {
            Some(ChunkCache::key(text, voice, engine, opts))
        } else {
            None
        };

        if let Some(ref key) = cache_key {
            if let Some(cached) = self.cache.get(key) {
                return Some(Segment {
                    samples: cached.samples,
                    sample_rate: cached.sample_rate,
                    engine,
                });
            }
        }

        let result = tokio::time::timeout(
            timeout,
            self.manager.synthesize(text, Some(engine), voice, opts),
        )
        .await;

        let tts_result = match result {
            Ok(Ok(r)) if r.success => r,
            Ok(Ok(r)) => {
                warn!(engine = %engine, error_kind = ?r.error_kind, "segment synthesis reported failure");
                return None;
            }
            Ok(Err(e)) => {
                warn!(engine = %engine, error = %e, "segment synthesis failed");
                return None;
            }
            Err(_) => {
                warn!(engine = %engine, timeout_ms = timeout.as_millis(), "segment synthesis timed out");
                return None;
            }
        };

        let audio_data = tts_result.audio_data?;
        let (samples, sample_rate) = match decode_wav_pcm16(&audio_data) {
            Ok(v) => v,
            Err(e) => {
                warn!(engine = %engine, error = %e, "failed to decode synthesized wav");
                return None;
            }
        };

        if let Some(key) = cache_key {
            self.cache.put(
                key,
                CachedSegment {
                    samples: samples.clone(),
                    sample_rate,
                },
            );
        }

        Some(Segment { samples, sample_rate, engine })
    }

    /// Runs the full plan and returns the ordered `ServerMessage`s to send.
    #[instrument(skip(self, text, opts), fields(voice = ?voice))]
    pub async fn run(
        &self,
        text: &str,
        voice: Option<&str>,
        opts: &SynthesizeOpts,
    ) -> Vec<ServerMessage> {
        let sequence_id = Uuid::new_v4().to_string();
        let crossfade_ms = self.policy.crossfade_ms;

        let intro_engine = self.intro_engine_effective(voice);
        let main_chain = self.main_engine_chain(voice);
        if main_chain.is_empty() {
            return vec![
                ServerMessage::error(ErrorCode::TtsNoEngine, "no tts engine available for voice"),
                ServerMessage::staged_tts_sequence_end(sequence_id),
            ];
        }

        let mut target_sr = self.policy.target_sample_rate;
        let mut segments: Vec<Segment> = Vec::new();

        if let Some(engine) = intro_engine {
            let intro_text = truncate_on_word_boundary(text, self.policy.max_intro_length);
            if !intro_text.is_empty() {
                let timeout = Duration::from_millis(self.policy.intro_timeout_ms);
                if let Some(segment) = self
                    .synthesize_segment(&intro_text, voice, engine, timeout, opts)
                    .await
                {
                    if target_sr.is_none() {
                        target_sr = Some(segment.sample_rate);
                    }
                    segments.push(segment);
                }
            }
        }

        let mut main_ok = false;
        for (i, &engine) in main_chain.iter().enumerate() {
            let mut timeout_ms = self.policy.main_timeout_ms;
            if engine == EngineKind::Zonos && !self.zonos_warmed_up.swap(true, Ordering::SeqCst) {
                timeout_ms = (timeout_ms as f64 * self.policy.first_call_factor.max(1.0)) as u64;
                info!(factor = self.policy.first_call_factor, "first zonos call, extending timeout");
            }
            let timeout = Duration::from_millis(timeout_ms);

            if let Some(main_segment) = self.synthesize_segment(text, voice, engine, timeout, opts).await {
                let target = target_sr.unwrap_or(main_segment.sample_rate);
                target_sr = Some(target);

                // Intro and main are emitted as separate ordered chunks, not
                // merged into one: the crossfade is a playback hint for the
                // client (carried as each chunk's `crossfade_ms`), not a
                // server-side mix. Merging them here would collapse a
                // multi-engine sequence into a single chunk under the main
                // engine's name, hiding that an intro engine ran at all.
                let main_samples = resample_mono(&main_segment.samples, main_segment.sample_rate, target);
                segments.push(Segment { samples: main_samples, sample_rate: target, engine });

                main_ok = true;
                break;
            }

            if i + 1 == main_chain.len() {
                warn!("all main engines failed for this sequence");
            }
        }

        if !main_ok {
            return vec![
                ServerMessage::error(ErrorCode::TtsSynthesisFailed, "all tts engines failed"),
                ServerMessage::staged_tts_sequence_end(sequence_id),
            ];
        }

        let max_chunks = self.policy.max_chunks;
        if segments.len() > max_chunks {
            warn!(segments = segments.len(), max_chunks, "truncating staged tts sequence to max_chunks");
            segments.truncate(max_chunks);
        }

        let total = segments.len() as u32;
        let mut messages = Vec::with_capacity(segments.len() + 1);
        for (index, segment) in segments.into_iter().enumerate() {
            let pcm = to_pcm_s16(&segment.samples);
            let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
            messages.push(ServerMessage::staged_tts_chunk(
                sequence_id.clone(),
                index as u32,
                total,
                segment.engine.as_str(),
                segment.sample_rate,
                "s16",
                BASE64.encode(bytes),
                crossfade_ms as u32,
            ));
        }
        messages.push(ServerMessage::staged_tts_sequence_end(sequence_id));
        messages
    }
}

fn truncate_on_word_boundary(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let truncated = &text[..max_len];
    match truncated.rfind(char::is_whitespace) {
        Some(idx) => truncated[..idx].to_string(),
        None => truncated.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_whole_words() {
        assert_eq!(truncate_on_word_boundary("hello wonderful world", 8), "hello");
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        assert_eq!(truncate_on_word_boundary("hi", 10), "hi");
    }

    #[test]
    fn truncate_with_no_whitespace_hard_cuts() {
        assert_eq!(truncate_on_word_boundary("abcdefghij", 5), "abcde");
    }

    mod sequence_tests {
        use super::*;
        use async_trait::async_trait;
        use tts_engine::{encode_wav_pcm16, EngineInfo, TtsEngine, TtsEngineError, TtsResult};
        use voice_registry::VoiceAliasRegistry;

        struct StubEngine {
            kind: EngineKind,
            fail: bool,
            sample_rate: u32,
        }

        #[async_trait]
        impl TtsEngine for StubEngine {
            fn kind(&self) -> EngineKind {
                self.kind
            }

            async fn initialize(&self) -> Result<(), TtsEngineError> {
                Ok(())
            }

            async fn synthesize(
                &self,
                text: &str,
                voice: Option<&str>,
                _opts: &SynthesizeOpts,
            ) -> Result<TtsResult, TtsEngineError> {
                if self.fail {
                    return Err(TtsEngineError::Synthesis("stub failure".to_string()));
                }
                let samples = vec![0.5f32; text.len().max(1) * 10];
                let wav = encode_wav_pcm16(&samples, self.sample_rate)?;
                Ok(TtsResult::ok(
                    wav,
                    self.sample_rate,
                    self.kind.as_str(),
                    voice.unwrap_or("default").to_string(),
                    1.0,
                ))
            }

            fn supported_voices(&self) -> Vec<String> {
                vec![]
            }

            fn engine_info(&self) -> EngineInfo {
                EngineInfo {
                    kind: self.kind,
                    native_sample_rate: self.sample_rate,
                    available: !self.fail,
                    unavailable_reason: None,
                }
            }

            fn native_sample_rate(&self) -> u32 {
                self.sample_rate
            }
        }

        async fn manager_with(engines: Vec<Arc<dyn TtsEngine>>) -> Arc<TtsManager> {
            Arc::new(
                TtsManager::initialize(
                    engines,
                    Arc::new(VoiceAliasRegistry::with_defaults()),
                    4,
                    true,
                    None,
                )
                .await
                .unwrap(),
            )
        }

        #[tokio::test]
        async fn emits_intro_and_main_chunks_with_sequence_end() {
            let manager = manager_with(vec![
                Arc::new(StubEngine { kind: EngineKind::Piper, fail: false, sample_rate: 22_050 }),
                Arc::new(StubEngine { kind: EngineKind::Zonos, fail: false, sample_rate: 48_000 }),
            ])
            .await;

            let pipeline = StagedTtsPipeline::new(manager, StagedTtsPolicy { ignore_voice_caps: true, ..StagedTtsPolicy::default() });
            let messages = pipeline.run("Hallo, wie geht es dir heute?", None, &SynthesizeOpts::new()).await;

            let chunks: Vec<&ServerMessage> =
                messages.iter().filter(|m| matches!(m, ServerMessage::StagedTtsChunk { .. })).collect();
            assert!(chunks.len() >= 2, "expected a separate intro chunk and main chunk, got {chunks:?}");
            assert!(matches!(chunks[0], ServerMessage::StagedTtsChunk { engine, .. } if engine == "piper"));
            assert!(matches!(messages.last(), Some(ServerMessage::StagedTtsSequenceEnd { .. })));
        }

        #[tokio::test]
        async fn intro_failure_does_not_abort_sequence() {
            let manager = manager_with(vec![
                Arc::new(StubEngine { kind: EngineKind::Piper, fail: true, sample_rate: 22_050 }),
                Arc::new(StubEngine { kind: EngineKind::Zonos, fail: false, sample_rate: 48_000 }),
            ])
            .await;

            let pipeline = StagedTtsPipeline::new(manager, StagedTtsPolicy { ignore_voice_caps: true, ..StagedTtsPolicy::default() });
            let messages = pipeline.run("short text", None, &SynthesizeOpts::new()).await;

            let has_error = messages.iter().any(|m| matches!(m, ServerMessage::Error { .. }));
            assert!(!has_error, "intro failure must not surface as a sequence error");
        }

        #[tokio::test]
        async fn all_engines_failing_emits_error_and_sequence_end() {
            let manager = manager_with(vec![Arc::new(StubEngine {
                kind: EngineKind::Piper,
                fail: true,
                sample_rate: 22_050,
            })])
            .await;

            let policy = StagedTtsPolicy {
                ignore_voice_caps: true,
                intro_engine: EngineKind::Kokoro,
                ..StagedTtsPolicy::default()
            };
            let pipeline = StagedTtsPipeline::new(manager, policy);
            let messages = pipeline.run("text", None, &SynthesizeOpts::new()).await;

            assert!(matches!(messages[0], ServerMessage::Error { .. }));
            assert!(matches!(messages[1], ServerMessage::StagedTtsSequenceEnd { .. }));
        }

        #[tokio::test]
        async fn falls_back_to_piper_when_main_engine_unavailable() {
            let manager = manager_with(vec![Arc::new(StubEngine {
                kind: EngineKind::Piper,
                fail: false,
                sample_rate: 22_050,
            })])
            .await;

            let policy = StagedTtsPolicy {
                ignore_voice_caps: true,
                intro_engine: EngineKind::Kokoro,
                main_engine: EngineKind::Zonos,
                ..StagedTtsPolicy::default()
            };
            let pipeline = StagedTtsPipeline::new(manager, policy);
            let messages = pipeline.run("text", None, &SynthesizeOpts::new()).await;

            let has_chunk = messages.iter().any(|m| matches!(m, ServerMessage::StagedTtsChunk { engine, .. } if engine == "piper"));
            assert!(has_chunk);
        }
    }
}
