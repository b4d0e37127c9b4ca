//! Prometheus-style metrics registry (C13, §4.13).
//!
//! A single struct of atomic counters/gauges plus two fixed-bucket
//! histograms, constructed once at startup and shared via `Arc`. Nothing is
//! pre-rendered: `render()` walks the live atomics on every `GET /metrics`
//! call. `cpu_percent`/`rss_bytes` are sampled from the current process via
//! `sysinfo` at render time, best-effort.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{Pid, System};

const LATENCY_BUCKETS: [f64; 6] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

#[derive(Default)]
struct Histogram {
    bucket_counts: [AtomicU64; LATENCY_BUCKETS.len()],
    sum_millis: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Cumulative by construction: an observation increments every bucket
    /// whose bound it falls under, so `bucket_counts[i]` already holds the
    /// Prometheus `le="<bound_i>"` cumulative count.
    fn observe(&self, seconds: f64) {
        for (bucket, bound) in self.bucket_counts.iter().zip(LATENCY_BUCKETS.iter()) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_millis.fetch_add((seconds * 1000.0).max(0.0).round() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, name: &str, out: &mut String) {
        let count = self.count.load(Ordering::Relaxed);
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bucket, bound) in self.bucket_counts.iter().zip(LATENCY_BUCKETS.iter()) {
            let v = bucket.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {v}");
        }
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
        let sum_seconds = self.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0;
        let _ = writeln!(out, "{name}_sum {sum_seconds}");
        let _ = writeln!(out, "{name}_count {count}");
    }
}

/// A counter broken down by one label value. The label space is small and
/// fixed in practice (protocol, error code, engine kind), so a
/// mutex-guarded map is simpler than per-variant atomics and just as safe
/// under the write rates involved.
#[derive(Default)]
struct LabeledCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl LabeledCounter {
    fn inc(&self, label: &str) {
        self.add(label, 1);
    }

    fn add(&self, label: &str, n: u64) {
        *self.counts.lock().entry(label.to_string()).or_insert(0) += n;
    }

    fn render(&self, name: &str, label_name: &str, out: &mut String) {
        let counts = self.counts.lock();
        if counts.is_empty() {
            return;
        }
        let _ = writeln!(out, "# TYPE {name} counter");
        for (label, count) in counts.iter() {
            let _ = writeln!(out, "{name}{{{label_name}=\"{label}\"}} {count}");
        }
    }
}

pub struct MetricsRegistry {
    messages_total: LabeledCounter,
    errors_total: LabeledCounter,
    tts_cache_hits: AtomicU64,
    tts_cache_misses: AtomicU64,
    chunks_emitted_total: LabeledCounter,
    sequence_timeouts_total: LabeledCounter,
    engine_unavailable_total: LabeledCounter,
    audio_bytes_in_total: AtomicU64,
    audio_bytes_out_total: AtomicU64,
    active_connections: AtomicI64,
    stt_latency_seconds: Histogram,
    tts_latency_seconds: Histogram,
    pid: Option<Pid>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self {
            messages_total: LabeledCounter::default(),
            errors_total: LabeledCounter::default(),
            tts_cache_hits: AtomicU64::new(0),
            tts_cache_misses: AtomicU64::new(0),
            chunks_emitted_total: LabeledCounter::default(),
            sequence_timeouts_total: LabeledCounter::default(),
            engine_unavailable_total: LabeledCounter::default(),
            audio_bytes_in_total: AtomicU64::new(0),
            audio_bytes_out_total: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            stt_latency_seconds: Histogram::default(),
            tts_latency_seconds: Histogram::default(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, protocol: &str) {
        self.messages_total.inc(protocol);
    }

    pub fn record_error(&self, code: &str) {
        self.errors_total.inc(code);
    }

    pub fn record_cache_hit(&self) {
        self.tts_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.tts_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_emitted(&self, engine: &str) {
        self.chunks_emitted_total.inc(engine);
    }

    pub fn record_sequence_timeout(&self, engine: &str) {
        self.sequence_timeouts_total.inc(engine);
    }

    pub fn record_engine_unavailable(&self, engine: &str) {
        self.engine_unavailable_total.inc(engine);
    }

    pub fn add_audio_bytes_in(&self, n: u64) {
        self.audio_bytes_in_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_audio_bytes_out(&self, n: u64) {
        self.audio_bytes_out_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn observe_stt_latency(&self, seconds: f64) {
        self.stt_latency_seconds.observe(seconds);
    }

    pub fn observe_tts_latency(&self, seconds: f64) {
        self.tts_latency_seconds.observe(seconds);
    }

    fn process_sample(&self) -> (f32, u64) {
        let Some(pid) = self.pid else {
            return (0.0, 0);
        };
        let mut system = System::new();
        system.refresh_process(pid);
        match system.process(pid) {
            Some(process) => (process.cpu_usage(), process.memory()),
            None => (0.0, 0),
        }
    }

    /// Renders the full registry to Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let (cpu_percent, rss_bytes) = self.process_sample();

        self.messages_total.render("voxgate_messages_total", "protocol", &mut out);
        self.errors_total.render("voxgate_errors_total", "code", &mut out);

        let _ = writeln!(out, "# TYPE voxgate_tts_cache_hits_total counter");
        let _ = writeln!(out, "voxgate_tts_cache_hits_total {}", self.tts_cache_hits.load(Ordering::Relaxed));
        let _ = writeln!(out, "# TYPE voxgate_tts_cache_misses_total counter");
        let _ = writeln!(out, "voxgate_tts_cache_misses_total {}", self.tts_cache_misses.load(Ordering::Relaxed));

        self.chunks_emitted_total.render("voxgate_chunks_emitted_total", "engine", &mut out);
        self.sequence_timeouts_total.render("voxgate_sequence_timeouts_total", "engine", &mut out);
        self.engine_unavailable_total.render("voxgate_engine_unavailable_total", "engine", &mut out);

        let _ = writeln!(out, "# TYPE voxgate_audio_bytes_in_total counter");
        let _ = writeln!(out, "voxgate_audio_bytes_in_total {}", self.audio_bytes_in_total.load(Ordering::Relaxed));
        let _ = writeln!(out, "# TYPE voxgate_audio_bytes_out_total counter");
        let _ = writeln!(out, "voxgate_audio_bytes_out_total {}", self.audio_bytes_out_total.load(Ordering::Relaxed));

        let _ = writeln!(out, "# TYPE voxgate_active_connections gauge");
        let _ = writeln!(out, "voxgate_active_connections {}", self.active_connections.load(Ordering::Relaxed));
        let _ = writeln!(out, "# TYPE voxgate_cpu_percent gauge");
        let _ = writeln!(out, "voxgate_cpu_percent {cpu_percent}");
        let _ = writeln!(out, "# TYPE voxgate_rss_bytes gauge");
        let _ = writeln!(out, "voxgate_rss_bytes {rss_bytes}");

        self.stt_latency_seconds.render("voxgate_stt_latency_seconds", &mut out);
        self.tts_latency_seconds.render("voxgate_tts_latency_seconds", &mut out);

        out
    }
}
