use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tts_engine::SynthesizeOpts;
use voice_registry::EngineKind;

#[derive(Clone)]
pub struct CachedSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// LRU cache of already-synthesized segments keyed by a digest of the
/// synthesis request (§4.5 Chunk cache). A cache hit still participates in
/// resampling/crossfade as if freshly synthesized.
pub struct ChunkCache {
    cache: Mutex<LruCache<String, CachedSegment>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn key(text: &str, voice: Option<&str>, engine: EngineKind, opts: &SynthesizeOpts) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(voice.unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(engine.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(opts.speed.to_le_bytes());
        hasher.update(opts.volume.to_le_bytes());
        hasher.update(opts.language.as_deref().unwrap_or("").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<CachedSegment> {
        let mut cache = self.cache.lock();
        let hit = cache.get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn put(&self, key: String, segment: CachedSegment) {
        self.cache.lock().put(key, segment);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
