use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cumulative_processing_time_ms: f64,
    pub last_used_unix_ms: Option<u64>,
}

impl EngineStats {
    pub fn average_processing_time_ms(&self) -> f64 {
        if self.successful_requests == 0 {
            0.0
        } else {
            self.cumulative_processing_time_ms / self.successful_requests as f64
        }
    }
}

/// Mutex-guarded per-engine counters (§4.4). A plain `Mutex<EngineStats>`
/// rather than atomics: updates touch several fields together and stay on
/// the cold path relative to synthesis itself.
#[derive(Default)]
pub struct EngineStatsTracker {
    inner: Mutex<EngineStats>,
}

impl EngineStatsTracker {
    pub fn record_success(&self, processing_time_ms: f64) {
        let mut stats = self.inner.lock();
        stats.total_requests += 1;
        stats.successful_requests += 1;
        stats.cumulative_processing_time_ms += processing_time_ms;
        stats.last_used_unix_ms = now_unix_ms();
    }

    pub fn record_failure(&self) {
        let mut stats = self.inner.lock();
        stats.total_requests += 1;
        stats.failed_requests += 1;
        stats.last_used_unix_ms = now_unix_ms();
    }

    pub fn snapshot(&self) -> EngineStats {
        self.inner.lock().clone()
    }
}

fn now_unix_ms() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}
