use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::buffer::{AudioBuffer, AudioChunk};
use crate::job::{FinalizedJob, JobProcessor};
use crate::vad::{VadConfig, VadProcessor};

#[derive(Debug, Clone)]
pub struct StreamManagerConfig {
    pub buffer_capacity: usize,
    pub queue_capacity: usize,
    pub max_audio_duration: Duration,
    pub vad_enabled: bool,
    pub vad_config: VadConfig,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 50,
            queue_capacity: 1000,
            max_audio_duration: Duration::from_secs(30),
            vad_enabled: true,
            vad_config: VadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamStartOpts {
    pub sample_rate: u32,
    pub tts_engine: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
    pub tts_volume: Option<f32>,
    pub vad_enabled: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("unknown stream id")]
    UnknownStream,
    #[error("stream is no longer accepting audio")]
    Inactive,
    #[error("buffer is full")]
    BufferOverflow,
    #[error("stream exceeded max_audio_duration")]
    DurationExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    AutoStop,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinalizeError {
    #[error("processing queue is closed")]
    QueueClosed,
}

struct StreamInner {
    buffer: AudioBuffer,
    vad: Option<VadProcessor>,
    pending_frame: Vec<f32>,
}

struct StreamEntry {
    client_id: String,
    sample_rate: u32,
    started_at: Instant,
    active: AtomicBool,
    tts_engine: Option<String>,
    tts_voice: Option<String>,
    tts_speed: Option<f32>,
    tts_volume: Option<f32>,
    inner: Mutex<StreamInner>,
}

/// Owns every live stream's buffer/VAD state and a bounded job queue that
/// feeds a pool of worker tasks, one child task per job (§4.9).
///
/// VAD auto-stop is reported via [`PushOutcome::AutoStop`] rather than
/// finalized internally: `push_chunk` only needs `&self`, so triggering
/// finalize (which needs to reach the owning `Arc` to spawn a task) is left
/// to the caller, who already holds that `Arc` from [`StreamManager::new`].
pub struct StreamManager {
    config: StreamManagerConfig,
    streams: Mutex<HashMap<String, Arc<StreamEntry>>>,
    job_tx: mpsc::Sender<FinalizedJob>,
}

impl StreamManager {
    pub fn new(config: StreamManagerConfig, processor: Arc<dyn JobProcessor>) -> Arc<Self> {
        let (job_tx, mut job_rx) = mpsc::channel(config.queue_capacity.max(1));
        let manager = Arc::new(Self {
            config,
            streams: Mutex::new(HashMap::new()),
            job_tx,
        });

        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let processor = processor.clone();
                tokio::spawn(async move {
                    processor.process(job).await;
                });
            }
        });

        manager
    }

    pub fn start_stream(&self, client_id: &str, opts: StreamStartOpts) -> String {
        let stream_id = format!("{client_id}_{}", random_suffix());
        let sample_rate = if opts.sample_rate != 0 {
            opts.sample_rate
        } else {
            self.config.vad_config.sample_rate
        };
        let vad_enabled = opts.vad_enabled.unwrap_or(self.config.vad_enabled);
        let vad = vad_enabled.then(|| {
            let mut vad_config = self.config.vad_config.clone();
            vad_config.sample_rate = sample_rate;
            VadProcessor::new(vad_config)
        });

        let entry = Arc::new(StreamEntry {
            client_id: client_id.to_string(),
            sample_rate,
            started_at: Instant::now(),
            active: AtomicBool::new(true),
            tts_engine: opts.tts_engine,
            tts_voice: opts.tts_voice,
            tts_speed: opts.tts_speed,
            tts_volume: opts.tts_volume,
            inner: Mutex::new(StreamInner {
                buffer: AudioBuffer::new(self.config.buffer_capacity),
                vad,
                pending_frame: Vec::new(),
            }),
        });

        self.streams.lock().insert(stream_id.clone(), entry);
        stream_id
    }

    /// Pushes one chunk of PCM16 bytes into the named stream, running VAD
    /// (if enabled) a frame at a time. `AutoStop` means VAD decided the
    /// utterance is over; the caller should respond by calling
    /// [`StreamManager::finalize`].
    pub fn push_chunk(
        &self,
        stream_id: &str,
        pcm16: Vec<u8>,
        sequence: u32,
    ) -> Result<PushOutcome, PushError> {
        let entry = {
            let streams = self.streams.lock();
            streams.get(stream_id).cloned().ok_or(PushError::UnknownStream)?
        };

        if !entry.active.load(Ordering::Acquire) {
            return Err(PushError::Inactive);
        }

        if entry.started_at.elapsed() > self.config.max_audio_duration {
            entry.active.store(false, Ordering::Release);
            warn!(stream_id, "stream exceeded max_audio_duration, no longer accepting chunks");
            return Err(PushError::DurationExceeded);
        }

        let mut inner = entry.inner.lock();
        if !inner.buffer.push(AudioChunk { sequence, pcm16: pcm16.clone() }) {
            return Err(PushError::BufferOverflow);
        }

        let Some(frame_size) = inner.vad.as_ref().map(VadProcessor::frame_size) else {
            return Ok(PushOutcome::Accepted);
        };
        if frame_size == 0 {
            return Ok(PushOutcome::Accepted);
        }

        inner.pending_frame.extend(pcm16_to_f32(&pcm16));
        let mut auto_stop = false;
        while inner.pending_frame.len() >= frame_size {
            let frame: Vec<f32> = inner.pending_frame.drain(..frame_size).collect();
            let continue_recording = inner.vad.as_mut().unwrap().process_frame(&frame);
            if !continue_recording {
                auto_stop = true;
                break;
            }
        }

        if auto_stop {
            Ok(PushOutcome::AutoStop)
        } else {
            Ok(PushOutcome::Accepted)
        }
    }

    /// Marks the stream inactive, drains its buffer, and enqueues a job.
    /// Idempotent: finalizing an already-finalized (or unknown) stream is a
    /// no-op that returns `Ok(())`.
    pub async fn finalize(&self, stream_id: &str) -> Result<(), FinalizeError> {
        let entry = {
            let mut streams = self.streams.lock();
            streams.remove(stream_id)
        };
        let Some(entry) = entry else {
            return Ok(());
        };

        entry.active.store(false, Ordering::Release);
        let pcm16 = entry.inner.lock().buffer.drain();

        let job = FinalizedJob {
            stream_id: stream_id.to_string(),
            client_id: entry.client_id.clone(),
            pcm16,
            sample_rate: entry.sample_rate,
            tts_engine: entry.tts_engine.clone(),
            tts_voice: entry.tts_voice.clone(),
            tts_speed: entry.tts_speed,
            tts_volume: entry.tts_volume,
        };

        self.job_tx.send(job).await.map_err(|_| FinalizeError::QueueClosed)
    }

    pub fn is_active(&self, stream_id: &str) -> bool {
        self.streams
            .lock()
            .get(stream_id)
            .map(|e| e.active.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingProcessor {
        seen: Arc<Mutex<Vec<FinalizedJob>>>,
    }

    #[async_trait]
    impl JobProcessor for RecordingProcessor {
        async fn process(&self, job: FinalizedJob) {
            self.seen.lock().push(job);
        }
    }

    fn manager_with_recorder(config: StreamManagerConfig) -> (Arc<StreamManager>, Arc<Mutex<Vec<FinalizedJob>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let processor = Arc::new(RecordingProcessor { seen: seen.clone() });
        (StreamManager::new(config, processor), seen)
    }

    fn no_vad_config() -> StreamManagerConfig {
        StreamManagerConfig {
            vad_enabled: false,
            ..StreamManagerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_push_finalize_round_trip() {
        let (manager, seen) = manager_with_recorder(no_vad_config());
        let stream_id = manager.start_stream("client1", StreamStartOpts::default());
        assert_eq!(
            manager.push_chunk(&stream_id, vec![1, 2], 0),
            Ok(PushOutcome::Accepted)
        );
        assert_eq!(
            manager.push_chunk(&stream_id, vec![3, 4], 1),
            Ok(PushOutcome::Accepted)
        );
        manager.finalize(&stream_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let jobs = seen.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].pcm16, vec![1, 2, 3, 4]);
        assert!(!manager.is_active(&stream_id));
    }

    #[tokio::test]
    async fn push_to_unknown_stream_fails() {
        let (manager, _seen) = manager_with_recorder(no_vad_config());
        assert_eq!(
            manager.push_chunk("nope", vec![0, 0], 0),
            Err(PushError::UnknownStream)
        );
    }

    #[tokio::test]
    async fn buffer_overflow_keeps_stream_active() {
        let config = StreamManagerConfig {
            buffer_capacity: 1,
            vad_enabled: false,
            ..StreamManagerConfig::default()
        };
        let (manager, _seen) = manager_with_recorder(config);
        let stream_id = manager.start_stream("client1", StreamStartOpts::default());
        assert_eq!(manager.push_chunk(&stream_id, vec![0, 0], 0), Ok(PushOutcome::Accepted));
        assert_eq!(manager.push_chunk(&stream_id, vec![0, 0], 1), Err(PushError::BufferOverflow));
        assert!(manager.is_active(&stream_id));
    }

    #[tokio::test]
    async fn duration_overflow_deactivates_stream() {
        let config = StreamManagerConfig {
            max_audio_duration: Duration::from_millis(1),
            vad_enabled: false,
            ..StreamManagerConfig::default()
        };
        let (manager, _seen) = manager_with_recorder(config);
        let stream_id = manager.start_stream("client1", StreamStartOpts::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            manager.push_chunk(&stream_id, vec![0, 0], 0),
            Err(PushError::DurationExceeded)
        );
        assert!(!manager.is_active(&stream_id));
        assert_eq!(
            manager.push_chunk(&stream_id, vec![0, 0], 1),
            Err(PushError::Inactive)
        );
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let (manager, seen) = manager_with_recorder(no_vad_config());
        let stream_id = manager.start_stream("client1", StreamStartOpts::default());
        manager.finalize(&stream_id).await.unwrap();
        manager.finalize(&stream_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn finalize_unknown_stream_is_a_noop() {
        let (manager, _seen) = manager_with_recorder(no_vad_config());
        assert!(manager.finalize("nope").await.is_ok());
    }

    #[tokio::test]
    async fn stream_ids_are_namespaced_by_client_and_unique() {
        let (manager, _seen) = manager_with_recorder(no_vad_config());
        let a = manager.start_stream("alice", StreamStartOpts::default());
        let b = manager.start_stream("alice", StreamStartOpts::default());
        assert!(a.starts_with("alice_"));
        assert!(b.starts_with("alice_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn sustained_silence_never_triggers_auto_stop() {
        let config = StreamManagerConfig {
            vad_enabled: true,
            vad_config: VadConfig {
                sample_rate: 8_000,
                frame_duration_ms: 10,
                ..VadConfig::default()
            },
            ..StreamManagerConfig::default()
        };
        let (manager, _seen) = manager_with_recorder(config);
        let stream_id = manager.start_stream("client1", StreamStartOpts { sample_rate: 8_000, ..Default::default() });
        let silent_chunk = vec![0u8; 80 * 2];
        for i in 0..10 {
            let outcome = manager.push_chunk(&stream_id, silent_chunk.clone(), i).unwrap();
            assert_eq!(outcome, PushOutcome::Accepted);
        }
    }
}
