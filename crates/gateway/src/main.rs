use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use audio_pipeline::StreamManager;
use intent_router::{
    default_classifier, ExternalWorkflowClient, GreetingSkill, HttpLlmClient, HttpWorkflowClient,
    IntentRouter, IntentRouterConfig, LlmClient, SkillRegistry,
};
use staged_tts::StagedTtsPipeline;
use stt_engine::{DummySttEngine, SttWorkerPool};
use tts_engine::{KokoroEngine, PiperEngine, TtsEngine, ZonosEngine};
use tts_manager::TtsManager;
use voice_registry::EngineKind;
use voxgate_gateway::config::AppConfig;
use voxgate_gateway::connection::ConnectionManager;
use voxgate_gateway::metrics::MetricsRegistry;
use voxgate_gateway::session::{GatewayState, SessionJobProcessor};
use voxgate_gateway::routes;

#[derive(Debug, Parser)]
#[command(author, version, about = "Real-time voice assistant gateway")]
struct Cli {
    /// Path to the engine/voice configuration file
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    /// Logging level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Warm up voices flagged `preload` during startup
    #[arg(long, default_value_t = false)]
    warmup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let (cfg, _config_dir) = AppConfig::load(cli.config.clone())?;

    let mut candidates: Vec<Arc<dyn TtsEngine>> = Vec::new();
    let mut warmup_targets: Vec<(EngineKind, String)> = Vec::new();

    if let Some(piper_cfg) = cfg.engines.piper.clone() {
        for voice in &piper_cfg.voices {
            if voice.preload {
                warmup_targets.push((EngineKind::Piper, voice.id.clone()));
            }
        }
        candidates.push(Arc::new(PiperEngine::new(piper_cfg)?));
    }
    if let Some(kokoro_cfg) = cfg.engines.kokoro.clone() {
        candidates.push(Arc::new(KokoroEngine::new(kokoro_cfg)));
    }
    if let Some(zonos_cfg) = cfg.engines.zonos.clone() {
        for voice in &zonos_cfg.voices {
            if voice.preload {
                warmup_targets.push((EngineKind::Zonos, voice.id.clone()));
            }
        }
        candidates.push(Arc::new(ZonosEngine::new(zonos_cfg)?));
    }
    anyhow::ensure!(!candidates.is_empty(), "no tts engine configured; set [piper], [kokoro] or [zonos] in the config file");

    let voices = Arc::new(cfg.engines.voice_registry()?);
    let tts_manager = Arc::new(
        TtsManager::initialize(
            candidates,
            voices,
            cfg.tts.max_parallel,
            cfg.tts.ignore_voice_caps,
            cfg.tts.default_engine,
        )
        .await
        .context("failed to initialize tts manager")?,
    );

    if cli.warmup {
        run_warmup(&tts_manager, &warmup_targets).await;
    }

    let staged = Arc::new(StagedTtsPipeline::new(tts_manager.clone(), cfg.staged.clone()));

    let stt = Arc::new(SttWorkerPool::new(Arc::new(DummySttEngine), cfg.stt.workers));

    let external_client: Option<Arc<dyn ExternalWorkflowClient>> = cfg.external.url.clone().map(|url| {
        Arc::new(
            HttpWorkflowClient::new(url, cfg.external.request_field.clone())
                .with_retry_policy(cfg.external.max_attempts, Duration::from_millis(cfg.external.base_delay_ms)),
        ) as Arc<dyn ExternalWorkflowClient>
    });

    let llm_client: Option<Arc<dyn LlmClient>> = if cfg.llm.enabled {
        cfg.llm.api_base.clone().map(|url| {
            Arc::new(
                HttpLlmClient::new(url, cfg.llm.default_model.clone())
                    .with_retry_policy(3, Duration::from_millis(250)),
            ) as Arc<dyn LlmClient>
        })
    } else {
        None
    };

    let mut skills = SkillRegistry::new();
    skills.register(Box::new(GreetingSkill));

    let router_config = IntentRouterConfig {
        llm_system_prompt: cfg.llm.system_prompt.clone(),
        llm_history_turns: cfg.llm.max_turns,
        ..IntentRouterConfig::default()
    };
    let router = Arc::new(IntentRouter::new(default_classifier(), skills, external_client, llm_client, router_config));

    let connections = Arc::new(ConnectionManager::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let processor = Arc::new(SessionJobProcessor {
        stt,
        router: router.clone(),
        staged: staged.clone(),
        connections: connections.clone(),
        metrics: metrics.clone(),
        default_speed: cfg.tts.speed,
        default_volume: cfg.tts.volume,
    });

    let stream_manager = StreamManager::new(
        audio_pipeline::StreamManagerConfig {
            buffer_capacity: cfg.audio.max_chunk_buffer,
            queue_capacity: 1000,
            max_audio_duration: Duration::from_secs(cfg.audio.max_audio_duration_secs),
            vad_enabled: cfg.vad.enabled,
            vad_config: cfg.vad.to_vad_config(cfg.audio.sample_rate),
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
        auth: cfg.auth.clone(),
        audio: cfg.audio.clone(),
        vad: cfg.vad.clone(),
        tts_runtime: cfg.tts.clone(),
        allowed_ips: cfg.transport.allowed_ips.clone(),
    });

    let voice_app = routes::build_voice_router(state.clone());
    let admin_app = routes::build_admin_router(state);

    let voice_addr: SocketAddr = format!("{}:{}", cfg.transport.ws_host, cfg.transport.ws_port)
        .parse()
        .context("WS_HOST/WS_PORT did not form a valid socket address")?;
    let admin_addr: SocketAddr = format!("{}:{}", cfg.transport.ws_host, cfg.transport.metrics_port)
        .parse()
        .context("WS_HOST/METRICS_PORT did not form a valid socket address")?;

    let voice_listener = tokio::net::TcpListener::bind(voice_addr)
        .await
        .with_context(|| format!("failed to bind voice listener to {voice_addr}"))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;

    info!(%voice_addr, %admin_addr, "voice gateway ready");

    let voice_server = axum::serve(voice_listener, voice_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_app).with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { voice_server.await.context("voice listener failed") },
        async { admin_server.await.context("admin listener failed") },
    )?;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new(format!("voxgate={level}")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing subscriber: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn run_warmup(manager: &Arc<TtsManager>, targets: &[(EngineKind, String)]) {
    if targets.is_empty() {
        info!("warmup skipped (no voices marked preload)");
        return;
    }

    info!(count = targets.len(), "starting voice warmup");
    let opts = tts_engine::SynthesizeOpts::new();
    for (engine, voice_id) in targets {
        let started = Instant::now();
        match manager.synthesize("Warmup sample", Some(*engine), Some(voice_id), &opts).await {
            Ok(_) => info!(voice = %voice_id, %engine, elapsed_ms = started.elapsed().as_millis(), "warmup completed"),
            Err(err) => warn!(voice = %voice_id, %engine, %err, "warmup failed"),
        }
    }
}
