//! WebSocket session handler (C10/C11, §4.10-§4.11, §5).
//!
//! One task per connection reads frames sequentially from the split stream
//! half; a dedicated writer task owns the sink half and is the only place a
//! `Message::Text`/`Message::Binary` is ever sent, so outbound ordering is
//! preserved without an extra lock (mirrors the teacher's split-socket
//! pattern, generalized with an explicit `ConnectionManager` in front of the
//! writer channel instead of a bare `mpsc`).

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use async_trait::async_trait;
use audio_pipeline::{FinalizedJob, JobProcessor, PushError, PushOutcome, StreamManager, StreamStartOpts};
use intent_router::IntentRouter;
use staged_tts::StagedTtsPipeline;
use stt_engine::SttWorkerPool;
use tts_engine::SynthesizeOpts;
use tts_manager::TtsManager;
use voice_protocol::control::{
    AudioChunkRequest, EndAudioStreamRequest, InboundEnvelope, SetTtsVoiceRequest,
    StartAudioStreamRequest, SwitchTtsEngineRequest, TextRequest,
};
use voice_protocol::{AudioFrame, CloseCode, ErrorCode, ServerMessage};
use voice_registry::EngineKind;

use crate::config::{AudioConfig, AuthConfig, TtsRuntimeConfig, VadSettings};
use crate::connection::ConnectionManager;
use crate::metrics::MetricsRegistry;

const WRITER_CHANNEL_CAPACITY: usize = 128;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a session needs that outlives any single connection.
pub struct GatewayState {
    pub stream_manager: Arc<StreamManager>,
    pub connections: Arc<ConnectionManager>,
    pub metrics: Arc<MetricsRegistry>,
    pub tts_manager: Arc<TtsManager>,
    pub staged: Arc<StagedTtsPipeline>,
    pub router: Arc<IntentRouter>,
    pub auth: AuthConfig,
    pub audio: AudioConfig,
    pub vad: VadSettings,
    pub tts_runtime: TtsRuntimeConfig,
    pub allowed_ips: Vec<std::net::IpAddr>,
}

/// Per-connection TTS preferences set via `switch_tts_engine`/`set_tts_voice`
/// and otherwise defaulted from `AppConfig`. Connection-local, touched only
/// by this session's own task (§5).
#[derive(Default, Clone)]
struct SessionPrefs {
    engine: Option<EngineKind>,
    voice: Option<String>,
}

impl SessionPrefs {
    fn resolve_engine(&self, explicit: Option<&str>, default_cfg: Option<EngineKind>) -> Option<EngineKind> {
        explicit.and_then(|s| EngineKind::from_str(s).ok()).or(self.engine).or(default_cfg)
    }

    fn resolve_voice(&self, explicit: Option<&str>, default_cfg: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.voice.clone())
            .or_else(|| default_cfg.map(str::to_string))
    }
}

/// Drives STT → intent routing → staged TTS for one finalized audio stream
/// (§4.9's hand-off seam). Built once at startup and shared by every
/// connection's streams through the single process-wide `StreamManager`.
pub struct SessionJobProcessor {
    pub stt: Arc<SttWorkerPool>,
    pub router: Arc<IntentRouter>,
    pub staged: Arc<StagedTtsPipeline>,
    pub connections: Arc<ConnectionManager>,
    pub metrics: Arc<MetricsRegistry>,
    pub default_speed: f32,
    pub default_volume: f32,
}

#[async_trait]
impl JobProcessor for SessionJobProcessor {
    #[instrument(skip(self, job), fields(stream_id = %job.stream_id, client_id = %job.client_id))]
    async fn process(&self, job: FinalizedJob) {
        let started = Instant::now();
        let transcript = match self.stt.transcribe(&job.pcm16, job.sample_rate, None).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "stt transcription failed");
                format!("[STT Error] {e}")
            }
        };
        self.metrics.observe_stt_latency(started.elapsed().as_secs_f64());

        self.connections
            .send(&job.client_id, ServerMessage::response(transcript.clone()))
            .await;

        let reply = self.router.route(&transcript).await;

        // Engine selection for synthesis runs off the process-wide current
        // engine (set by `switch_tts_engine`); only voice is per-call.
        let opts = SynthesizeOpts {
            speed: job.tts_speed.unwrap_or(self.default_speed),
            volume: job.tts_volume.unwrap_or(self.default_volume),
            language: None,
        };

        let tts_started = Instant::now();
        let messages = self.staged.run(&reply, job.tts_voice.as_deref(), &opts).await;
        self.metrics.observe_tts_latency(tts_started.elapsed().as_secs_f64());

        for msg in messages {
            if let ServerMessage::StagedTtsChunk { engine, .. } = &msg {
                self.metrics.record_chunk_emitted(engine);
            }
            self.connections.send(&job.client_id, msg).await;
        }
    }
}

pub async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sink, mut stream) = socket.split();

    let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next()).await;
    let handshake_ok = matches!(hello, Ok(Some(Ok(Message::Text(ref t)))) if is_hello(t));
    if !handshake_ok {
        let code = match hello {
            Err(_) => CloseCode::HandshakeTimeout,
            _ => CloseCode::BadHandshake,
        };
        close_with(&mut sink, code).await;
        return;
    }

    let client_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
    let stats = state.connections.register(&client_id, tx);
    state.metrics.connection_opened();
    tokio::spawn(writer_task(sink, rx));

    state.connections.send(&client_id, ServerMessage::ready()).await;

    read_loop(&client_id, &mut stream, &state, &stats).await;

    state.connections.unregister(&client_id);
    state.metrics.connection_closed();
    info!(client_id = %client_id, "session closed");
}

fn is_hello(text: &str) -> bool {
    serde_json::from_str::<InboundEnvelope>(text)
        .ok()
        .and_then(|e| e.discriminant().map(str::to_string))
        .as_deref()
        == Some("hello")
}

async fn close_with(sink: &mut SplitSink<WebSocket, Message>, code: CloseCode) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: code.code(),
            reason: code.to_string().into(),
        })))
        .await;
}

async fn writer_task(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<ServerMessage>) {
    while let Some(msg) = rx.recv().await {
        let text = match serde_json::to_string(&msg) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound message");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

async fn read_loop(
    client_id: &str,
    stream: &mut futures::stream::SplitStream<WebSocket>,
    state: &Arc<GatewayState>,
    stats: &Arc<crate::connection::ConnectionStats>,
) {
    let mut prefs = SessionPrefs::default();
    let bytes_per_frame = 2usize * state.audio.channels as usize;

    while let Some(next) = stream.next().await {
        let message = match next {
            Ok(m) => m,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => {
                stats.record_received(text.len());
                state.metrics.record_message("text");
                handle_control_message(client_id, &text, state, &mut prefs).await;
            }
            Message::Binary(bytes) => {
                stats.record_received(bytes.len());
                state.metrics.record_message("binary");
                state.metrics.add_audio_bytes_in(bytes.len() as u64);
                handle_binary_frame(client_id, &bytes, bytes_per_frame, state).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn handle_binary_frame(client_id: &str, bytes: &[u8], bytes_per_frame: usize, state: &Arc<GatewayState>) {
    match AudioFrame::parse(bytes, Some(bytes_per_frame)) {
        Ok(frame) => {
            handle_push_outcome(
                client_id,
                &frame.stream_id,
                state,
                state.stream_manager.push_chunk(&frame.stream_id, frame.pcm16, frame.sequence),
            )
            .await;
        }
        Err(e) => {
            let code = match e {
                voice_protocol::FrameError::InvalidPcmLength(_, _) => ErrorCode::PcmFrameInvalidLength,
                _ => ErrorCode::AudioFrameInvalid,
            };
            state.metrics.record_error(&code.to_string());
            state.connections.send(client_id, ServerMessage::error(code, e.to_string())).await;
        }
    }
}

async fn handle_push_outcome(
    client_id: &str,
    stream_id: &str,
    state: &Arc<GatewayState>,
    outcome: Result<PushOutcome, PushError>,
) {
    match outcome {
        Ok(PushOutcome::Accepted) => {}
        Ok(PushOutcome::AutoStop) => {
            let ok = state.stream_manager.finalize(stream_id).await.is_ok();
            state.connections.send(client_id, ServerMessage::audio_stream_ended(stream_id, ok)).await;
        }
        Err(e) => {
            let code = match e {
                PushError::UnknownStream | PushError::Inactive => ErrorCode::StreamUnknown,
                PushError::BufferOverflow | PushError::DurationExceeded => ErrorCode::BufferOverflow,
            };
            state.metrics.record_error(&code.to_string());
            state
                .connections
                .send(client_id, ServerMessage::audio_stream_error(stream_id, code, e.to_string()))
                .await;
        }
    }
}

async fn handle_control_message(client_id: &str, text: &str, state: &Arc<GatewayState>, prefs: &mut SessionPrefs) {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            state.metrics.record_error("invalid_json");
            state
                .connections
                .send(client_id, ServerMessage::error(ErrorCode::InvalidJson, e.to_string()))
                .await;
            return;
        }
    };

    let Some(op) = envelope.discriminant().map(str::to_string) else {
        state.metrics.record_error("invalid_json");
        state
            .connections
            .send(client_id, ServerMessage::error(ErrorCode::InvalidJson, "missing op/type"))
            .await;
        return;
    };

    match op.as_str() {
        "hello" => {
            state.connections.send(client_id, ServerMessage::ready()).await;
        }
        "start_audio_stream" => {
            let req: StartAudioStreamRequest = parse_payload(&envelope).unwrap_or_default();
            let engine = prefs.resolve_engine(req.tts_engine.as_deref(), state.tts_runtime.default_engine);
            let voice = prefs.resolve_voice(req.tts_voice.as_deref(), state.tts_runtime.voice.as_deref());
            let opts = StreamStartOpts {
                sample_rate: state.audio.sample_rate,
                tts_engine: engine.map(|e| e.to_string()),
                tts_voice: voice,
                tts_speed: req.tts_speed.or(Some(state.tts_runtime.speed)),
                tts_volume: req.tts_volume.or(Some(state.tts_runtime.volume)),
                vad_enabled: Some(state.vad.enabled),
            };
            let stream_id = state.stream_manager.start_stream(client_id, opts);
            state.connections.send(client_id, ServerMessage::audio_stream_started(stream_id)).await;
        }
        "audio_chunk" => {
            let Some(req): Option<AudioChunkRequest> = parse_payload(&envelope) else {
                state.connections.send(client_id, ServerMessage::error(ErrorCode::InvalidJson, "bad audio_chunk")).await;
                return;
            };
            let Some(pcm16) = req.chunk.as_deref().and_then(|b64| BASE64.decode(b64).ok()) else {
                state
                    .connections
                    .send(client_id, ServerMessage::audio_stream_error(&req.stream_id, ErrorCode::AudioFrameInvalid, "missing or invalid chunk"))
                    .await;
                return;
            };
            handle_push_outcome(
                client_id,
                &req.stream_id,
                state,
                state.stream_manager.push_chunk(&req.stream_id, pcm16, req.sequence),
            )
            .await;
        }
        "end_audio_stream" => {
            let Some(req): Option<EndAudioStreamRequest> = parse_payload(&envelope) else {
                state.connections.send(client_id, ServerMessage::error(ErrorCode::InvalidJson, "bad end_audio_stream")).await;
                return;
            };
            let ok = state.stream_manager.finalize(&req.stream_id).await.is_ok();
            state.connections.send(client_id, ServerMessage::audio_stream_ended(req.stream_id, ok)).await;
        }
        "text" => {
            let Some(req): Option<TextRequest> = parse_payload(&envelope) else {
                state.connections.send(client_id, ServerMessage::error(ErrorCode::InvalidJson, "bad text request")).await;
                return;
            };
            let voice = prefs.resolve_voice(req.tts_voice.as_deref(), state.tts_runtime.voice.as_deref());
            if let (Some(engine_str), Some(voice_id)) = (req.tts_engine.as_deref(), voice.as_deref()) {
                if let Ok(kind) = EngineKind::from_str(engine_str) {
                    if !state.tts_manager.engine_allowed_for_voice(kind, voice_id) {
                        state
                            .connections
                            .send(
                                client_id,
                                ServerMessage::error(
                                    ErrorCode::VoiceEngineMismatch,
                                    format!("voice '{voice_id}' not bound to engine '{kind}'"),
                                ),
                            )
                            .await;
                        return;
                    }
                }
            }
            let opts = SynthesizeOpts {
                speed: req.tts_speed.unwrap_or(state.tts_runtime.speed),
                volume: req.tts_volume.unwrap_or(state.tts_runtime.volume),
                language: None,
            };
            let reply = state.router.route(&req.content).await;
            let messages = state.staged.run(&reply, voice.as_deref(), &opts).await;
            for msg in messages {
                if let ServerMessage::StagedTtsChunk { engine, .. } = &msg {
                    state.metrics.record_chunk_emitted(engine);
                }
                state.connections.send(client_id, msg).await;
            }
        }
        "switch_tts_engine" => {
            let Some(req): Option<SwitchTtsEngineRequest> = parse_payload(&envelope) else {
                state.connections.send(client_id, ServerMessage::TtsSwitchError { op: "tts_switch_error", type_: "tts_switch_error", message: "bad request".to_string() }).await;
                return;
            };
            match EngineKind::from_str(&req.engine) {
                Ok(kind) if state.tts_manager.switch_engine(kind).is_ok() => {
                    prefs.engine = Some(kind);
                    state
                        .connections
                        .send(client_id, ServerMessage::TtsEngineSwitched { op: "tts_engine_switched", type_: "tts_engine_switched", engine: kind.to_string() })
                        .await;
                }
                Ok(_) => {
                    state
                        .connections
                        .send(client_id, ServerMessage::TtsSwitchError { op: "tts_switch_error", type_: "tts_switch_error", message: format!("engine '{}' unavailable", req.engine) })
                        .await;
                }
                Err(e) => {
                    state
                        .connections
                        .send(client_id, ServerMessage::TtsSwitchError { op: "tts_switch_error", type_: "tts_switch_error", message: e })
                        .await;
                }
            }
        }
        "set_tts_voice" => {
            let Some(req): Option<SetTtsVoiceRequest> = parse_payload(&envelope) else {
                state.connections.send(client_id, ServerMessage::TtsVoiceError { op: "tts_voice_error", type_: "tts_voice_error", message: "bad request".to_string() }).await;
                return;
            };
            let engine = req.engine.as_deref().and_then(|s| EngineKind::from_str(s).ok()).or(prefs.engine).or(state.tts_runtime.default_engine);
            if let Some(kind) = engine {
                if !state.tts_manager.engine_allowed_for_voice(kind, &req.voice) {
                    state
                        .connections
                        .send(client_id, ServerMessage::TtsVoiceError { op: "tts_voice_error", type_: "tts_voice_error", message: format!("voice '{}' not bound to engine '{}'", req.voice, kind) })
                        .await;
                    return;
                }
            }
            prefs.voice = Some(req.voice.clone());
            state
                .connections
                .send(client_id, ServerMessage::TtsVoiceChanged { op: "tts_voice_changed", type_: "tts_voice_changed", voice: req.voice, engine: engine.map(|e| e.to_string()) })
                .await;
        }
        "get_tts_info" => {
            let engines = state.tts_manager.available_engines();
            let available_engines: Vec<String> = engines.iter().map(|e| e.to_string()).collect();
            let available_voices: BTreeSet<String> =
                engines.iter().flat_map(|e| state.tts_manager.supported_voices(*e)).collect();
            let current_engine = prefs
                .engine
                .or(state.tts_manager.default_engine())
                .map(|e| e.to_string())
                .unwrap_or_default();
            let engine_stats = serde_json::to_value(state.tts_manager.engine_stats()).unwrap_or(serde_json::Value::Null);
            state
                .connections
                .send(
                    client_id,
                    ServerMessage::TtsInfo {
                        op: "tts_info",
                        type_: "tts_info",
                        available_engines,
                        available_voices: available_voices.into_iter().collect(),
                        current_engine,
                        engine_stats,
                        switching_enabled: state.tts_runtime.enable_switching,
                    },
                )
                .await;
        }
        "ping" => {
            state.connections.send(client_id, ServerMessage::pong()).await;
        }
        other => {
            tracing::debug!(op = other, "unrecognized control message, ignoring");
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(envelope: &InboundEnvelope) -> Option<T> {
    serde_json::from_value(envelope.payload.clone()).ok()
}
