use std::collections::VecDeque;

use tracing::warn;

/// Tuning for [`VadProcessor`] (§4.7). Defaults mirror the reference
/// implementation's `VADConfig`.
#[derive(Debug, Clone)]
pub struct VadConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub energy_threshold: f32,
    pub silence_duration_ms: u32,
    pub min_speech_duration_ms: u32,
    pub energy_history_size: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 30,
            energy_threshold: 0.01,
            silence_duration_ms: 1_500,
            min_speech_duration_ms: 500,
            energy_history_size: 10,
        }
    }
}

impl VadConfig {
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    fn silence_threshold_frames(&self) -> u32 {
        (self.silence_duration_ms / self.frame_duration_ms.max(1)).max(1)
    }

    fn min_speech_frames(&self) -> u32 {
        (self.min_speech_duration_ms / self.frame_duration_ms.max(1)).max(1)
    }
}

/// Snapshot of [`VadProcessor`] internal counters, exposed for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct VadStats {
    pub speech_frames: u32,
    pub silence_frames: u32,
    pub adaptive_threshold: f32,
    pub is_speech_started: bool,
    pub energy_history_len: usize,
}

const VOICE_LIKE_FLOOR: f32 = 0.001;

/// Energy + crude frequency-variation VAD with an adaptive threshold and
/// silence-based auto-stop (§4.7). `process_frame` never propagates an
/// error: malformed input is logged and treated as "keep recording".
pub struct VadProcessor {
    config: VadConfig,
    energy_history: VecDeque<f32>,
    speech_frames: u32,
    silence_frames: u32,
    adaptive_threshold: f32,
    is_speech_started: bool,
}

impl VadProcessor {
    pub fn new(config: VadConfig) -> Self {
        let adaptive_threshold = config.energy_threshold;
        Self {
            config,
            energy_history: VecDeque::new(),
            speech_frames: 0,
            silence_frames: 0,
            adaptive_threshold,
            is_speech_started: false,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.config.frame_size()
    }

    pub fn reset(&mut self) {
        self.energy_history.clear();
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.is_speech_started = false;
        self.adaptive_threshold = self.config.energy_threshold;
    }

    pub fn stats(&self) -> VadStats {
        VadStats {
            speech_frames: self.speech_frames,
            silence_frames: self.silence_frames,
            adaptive_threshold: self.adaptive_threshold,
            is_speech_started: self.is_speech_started,
            energy_history_len: self.energy_history.len(),
        }
    }

    /// Returns `true` if recording should continue, `false` to auto-stop.
    pub fn process_frame(&mut self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            warn!("vad received an empty frame, continuing without updating state");
            return true;
        }

        let energy = rms(frame);
        if !energy.is_finite() {
            warn!(energy, "vad energy computation produced a non-finite value");
            return true;
        }

        self.energy_history.push_back(energy);
        if self.energy_history.len() > self.config.energy_history_size {
            self.energy_history.pop_front();
        }

        let threshold = if self.energy_history.len() >= 3 {
            let adaptive = median(&self.energy_history) * 1.5;
            self.adaptive_threshold = adaptive.max(self.config.energy_threshold);
            self.adaptive_threshold
        } else {
            self.config.energy_threshold
        };

        let is_voice_like = std_dev(frame) > VOICE_LIKE_FLOOR;
        let is_speech = energy > threshold && is_voice_like;

        if is_speech {
            self.speech_frames += 1;
            self.silence_frames = 0;
            if self.speech_frames >= self.config.min_speech_frames() {
                self.is_speech_started = true;
            }
        } else {
            self.silence_frames += 1;
        }

        let should_stop =
            self.is_speech_started && self.silence_frames >= self.config.silence_threshold_frames();
        !should_stop
    }
}

fn rms(frame: &[f32]) -> f32 {
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

fn std_dev(frame: &[f32]) -> f32 {
    let mean = frame.iter().sum::<f32>() / frame.len() as f32;
    let variance = frame.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / frame.len() as f32;
    variance.sqrt()
}

fn median(values: &VecDeque<f32>) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
