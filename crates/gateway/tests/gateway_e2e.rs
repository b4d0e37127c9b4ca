//! End-to-end tests driving the gateway over a real websocket connection,
//! with a stub `TtsEngine` in place of the real Piper/Kokoro/Zonos adapters
//! and `DummySttEngine` for transcription. Grounded on the teacher's own
//! `tts_ws_test`-style harness: connect with `tokio_tungstenite`, drive the
//! control protocol, assert on the JSON frames that come back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use audio_pipeline::{StreamManager, StreamManagerConfig};
use intent_router::{default_classifier, GreetingSkill, IntentRouter, IntentRouterConfig, SkillRegistry};
use staged_tts::StagedTtsPipeline;
use stt_engine::{DummySttEngine, SttWorkerPool};
use tts_engine::{encode_wav_pcm16, EngineInfo, SynthesizeOpts, TtsEngine, TtsEngineError, TtsResult};
use tts_manager::TtsManager;
use voice_protocol::AudioFrame;
use voice_registry::{EngineKind, EngineVoice, VoiceAliasRegistry};
use voxgate_gateway::config::{AudioConfig, AuthConfig, TtsRuntimeConfig, VadSettings};
use voxgate_gateway::connection::ConnectionManager;
use voxgate_gateway::metrics::MetricsRegistry;
use voxgate_gateway::routes;
use voxgate_gateway::session::{GatewayState, SessionJobProcessor};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Fake engine standing in for Piper/Kokoro/Zonos: always succeeds, returns
/// a short silent WAV sized off the input text so every call is distinct.
struct StubEngine {
    kind: EngineKind,
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
        let samples = vec![0.3f32; text.len().max(1) * 8];
        let wav = encode_wav_pcm16(&samples, self.sample_rate)?;
        Ok(TtsResult::ok(wav, self.sample_rate, self.kind.as_str(), voice.unwrap_or("default").to_string(), 1.0))
    }

    fn supported_voices(&self) -> Vec<String> {
        vec![]
    }

    fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            kind: self.kind,
            native_sample_rate: self.sample_rate,
            available: true,
            unavailable_reason: None,
        }
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

struct TestGateway {
    addr: SocketAddr,
}

impl TestGateway {
    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

fn default_vad() -> VadSettings {
    VadSettings {
        enabled: false,
        silence_duration_ms: 1_500,
        energy_threshold: 0.01,
        min_speech_duration_ms: 500,
    }
}

fn default_policy() -> staged_tts::StagedTtsPolicy {
    staged_tts::StagedTtsPolicy {
        intro_engine: EngineKind::Piper,
        main_engine: EngineKind::Piper,
        ignore_voice_caps: true,
        ..staged_tts::StagedTtsPolicy::default()
    }
}

/// Builds a full gateway (stub tts engine, dummy stt, real router/staged
/// pipeline/stream manager) and serves it on an ephemeral localhost port.
async fn spawn_gateway(
    staged_policy: staged_tts::StagedTtsPolicy,
    vad: VadSettings,
    voices: VoiceAliasRegistry,
    ignore_voice_caps: bool,
) -> TestGateway {
    let engine: Arc<dyn TtsEngine> = Arc::new(StubEngine { kind: EngineKind::Piper, sample_rate: 22_050 });
    let tts_manager = Arc::new(
        TtsManager::initialize(vec![engine], Arc::new(voices), 4, ignore_voice_caps, Some(EngineKind::Piper))
            .await
            .expect("tts manager initializes with a single stub engine"),
    );
    let staged = Arc::new(StagedTtsPipeline::new(tts_manager.clone(), staged_policy));
    let stt = Arc::new(SttWorkerPool::new(Arc::new(DummySttEngine), None));

    let mut skills = SkillRegistry::new();
    skills.register(Box::new(GreetingSkill));
    let router = Arc::new(IntentRouter::new(default_classifier(), skills, None, None, IntentRouterConfig::default()));

    let connections = Arc::new(ConnectionManager::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let processor = Arc::new(SessionJobProcessor {
        stt,
        router: router.clone(),
        staged: staged.clone(),
        connections: connections.clone(),
        metrics: metrics.clone(),
        default_speed: 1.0,
        default_volume: 1.0,
    });

    let audio = AudioConfig {
        chunk_size: 4_096,
        sample_rate: 16_000,
        channels: 1,
        max_chunk_buffer: 50,
        max_audio_duration_secs: 30,
    };
    let vad_config = vad.to_vad_config(audio.sample_rate);

    let stream_manager = StreamManager::new(
        StreamManagerConfig {
            buffer_capacity: 50,
            queue_capacity: 100,
            max_audio_duration: Duration::from_secs(30),
            vad_enabled: vad.enabled,
            vad_config,
        },
        processor,
    );

    let state = Arc::new(GatewayState {
        stream_manager,
        connections,
        metrics,
        tts_manager,
        staged,
        router,
        auth: AuthConfig { jwt_secret: "test".to_string(), jwt_bypass: true, jwt_allow_plain: false },
        audio,
        vad,
        tts_runtime: TtsRuntimeConfig {
            default_engine: Some(EngineKind::Piper),
            voice: None,
            speed: 1.0,
            volume: 1.0,
            target_sample_rate: None,
            enable_switching: true,
            max_parallel: 4,
            ignore_voice_caps,
        },
        allowed_ips: Vec::new(),
    });

    let app = routes::build_voice_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .ok();
    });

    TestGateway { addr }
}

async fn connect(gateway: &TestGateway) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await.expect("connect to gateway");
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(WsMessage::Text(value.to_string())).await.expect("send control message");
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        match ws.next().await.expect("stream ended unexpectedly").expect("websocket error") {
            WsMessage::Text(text) => return serde_json::from_str(&text).expect("server sent invalid json"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected non-text message: {other:?}"),
        }
    }
}

async fn say_hello(ws: &mut WsStream) {
    send_json(ws, json!({ "op": "hello", "features": {} })).await;
    let ready = recv_json(ws).await;
    assert_eq!(ready["op"], "ready");
    assert_eq!(ready["features"]["binary_audio"], true);
}

fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect()
}

#[tokio::test]
async fn handshake_and_staged_tts_happy_path() {
    let gateway = spawn_gateway(default_policy(), default_vad(), VoiceAliasRegistry::new(Default::default()), true).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(&mut ws, json!({ "op": "text", "content": "hallo there, how are you" })).await;

    let mut saw_chunk = false;
    loop {
        let msg = recv_json(&mut ws).await;
        match msg["op"].as_str() {
            Some("staged_tts_chunk") => {
                saw_chunk = true;
                assert_eq!(msg["engine"], "piper");
            }
            Some("staged_tts_sequence_end") => break,
            other => panic!("unexpected message op: {other:?}"),
        }
    }
    assert!(saw_chunk, "expected at least one staged tts chunk before the sequence end");
}

#[tokio::test]
async fn intro_engine_unavailable_falls_back_to_single_main_chunk() {
    let policy = staged_tts::StagedTtsPolicy {
        intro_engine: EngineKind::Kokoro,
        main_engine: EngineKind::Piper,
        ignore_voice_caps: true,
        ..staged_tts::StagedTtsPolicy::default()
    };
    let gateway = spawn_gateway(policy, default_vad(), VoiceAliasRegistry::new(Default::default()), true).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(&mut ws, json!({ "op": "text", "content": "short reply" })).await;

    let chunk = recv_json(&mut ws).await;
    assert_eq!(chunk["op"], "staged_tts_chunk");
    assert_eq!(chunk["index"], 0);
    assert_eq!(chunk["total"], 1);
    assert_eq!(chunk["engine"], "piper");

    let end = recv_json(&mut ws).await;
    assert_eq!(end["op"], "staged_tts_sequence_end");
}

#[tokio::test]
async fn voice_not_bound_to_any_engine_reports_no_engine_error() {
    let policy = staged_tts::StagedTtsPolicy {
        intro_engine: EngineKind::Piper,
        main_engine: EngineKind::Piper,
        ignore_voice_caps: false,
        ..staged_tts::StagedTtsPolicy::default()
    };
    // empty alias table: no voice is bound to any engine, and the manager
    // does not ignore voice caps, so gating must hard-reject the request.
    let gateway = spawn_gateway(policy, default_vad(), VoiceAliasRegistry::new(Default::default()), false).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(&mut ws, json!({ "op": "text", "content": "hello", "tts_voice": "unbound-voice" })).await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "tts_no_engine");

    let end = recv_json(&mut ws).await;
    assert_eq!(end["op"], "staged_tts_sequence_end");
}

#[tokio::test]
async fn explicit_engine_mismatched_with_bound_voice_reports_error() {
    let policy = staged_tts::StagedTtsPolicy {
        intro_engine: EngineKind::Piper,
        main_engine: EngineKind::Piper,
        ignore_voice_caps: false,
        ..staged_tts::StagedTtsPolicy::default()
    };
    // "de-thorsten-low" is bound to piper only; requesting kokoro explicitly
    // for that voice must be rejected before any synthesis is attempted.
    let mut piper_only = HashMap::new();
    piper_only.insert(EngineKind::Piper, EngineVoice::new().with_voice_id("de-thorsten-low"));
    let mut table = HashMap::new();
    table.insert("de-thorsten-low".to_string(), piper_only);
    let gateway = spawn_gateway(policy, default_vad(), VoiceAliasRegistry::new(table), false).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(
        &mut ws,
        json!({ "op": "text", "content": "hallo", "tts_voice": "de-thorsten-low", "tts_engine": "kokoro" }),
    )
    .await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "voice_engine_mismatch");
}

#[tokio::test]
async fn binary_audio_ingest_transcribes_and_responds() {
    let gateway = spawn_gateway(default_policy(), default_vad(), VoiceAliasRegistry::new(Default::default()), true).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(&mut ws, json!({ "op": "start_audio_stream" })).await;
    let started = recv_json(&mut ws).await;
    assert_eq!(started["op"], "audio_stream_started");
    let stream_id = started["stream_id"].as_str().expect("stream_id present").to_string();

    let pcm = vec![0u8; 320];
    let frame = AudioFrame::build(&stream_id, 0, 0.0, &pcm).expect("stream id within limit");
    ws.send(WsMessage::Binary(frame)).await.expect("send audio frame");

    send_json(&mut ws, json!({ "op": "end_audio_stream", "stream_id": stream_id })).await;
    let ended = recv_json(&mut ws).await;
    assert_eq!(ended["op"], "audio_stream_ended");
    assert_eq!(ended["success"], true);

    let response = recv_json(&mut ws).await;
    assert_eq!(response["op"], "response");
    assert_eq!(response["transcription"], pcm.len().to_string());

    loop {
        let msg = recv_json(&mut ws).await;
        if msg["op"] == "staged_tts_sequence_end" {
            break;
        }
    }
}

#[tokio::test]
async fn binary_frame_too_short_reports_error() {
    let gateway = spawn_gateway(default_policy(), default_vad(), VoiceAliasRegistry::new(Default::default()), true).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    ws.send(WsMessage::Binary(vec![0u8; 5])).await.expect("send undersized frame");

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "audio_frame_invalid");
}

#[tokio::test]
async fn vad_auto_stop_finalizes_stream_without_explicit_end() {
    let vad = VadSettings {
        enabled: true,
        silence_duration_ms: 20,
        energy_threshold: 0.01,
        min_speech_duration_ms: 20,
    };
    let gateway = spawn_gateway(default_policy(), vad, VoiceAliasRegistry::new(Default::default()), true).await;
    let mut ws = connect(&gateway).await;
    say_hello(&mut ws).await;

    send_json(&mut ws, json!({ "op": "start_audio_stream" })).await;
    let started = recv_json(&mut ws).await;
    let stream_id = started["stream_id"].as_str().expect("stream_id present").to_string();

    // one speech frame (enough to cross min_speech_duration_ms) followed by
    // one silent frame (enough to cross silence_duration_ms) at the default
    // 30ms frame size for 16kHz audio (480 samples/frame).
    let loud: Vec<f32> = (0..480).map(|i| 0.6 * ((i as f32) * 0.3).sin()).collect();
    let silent: Vec<f32> = vec![0.0; 480];
    let mut samples = loud;
    samples.extend(silent);
    let pcm = samples_to_pcm16(&samples);

    let frame = AudioFrame::build(&stream_id, 0, 0.0, &pcm).expect("stream id within limit");
    ws.send(WsMessage::Binary(frame)).await.expect("send speech+silence frame");

    let ended = recv_json(&mut ws).await;
    assert_eq!(ended["op"], "audio_stream_ended");
    assert_eq!(ended["stream_id"], stream_id);
    assert_eq!(ended["success"], true);
}
