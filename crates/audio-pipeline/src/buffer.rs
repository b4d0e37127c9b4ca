use std::collections::VecDeque;

/// One ingested chunk, tagged with its client-supplied sequence number so
/// ordering can be reconstructed at drain time regardless of arrival order.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub sequence: u32,
    pub pcm16: Vec<u8>,
}

/// Bounded FIFO of audio chunks for one stream (§4.6). Push fails instead of
/// evicting once the buffer is full; the caller is expected to surface that
/// as an `audio_stream_error` and keep the stream alive.
pub struct AudioBuffer {
    capacity: usize,
    chunks: VecDeque<AudioChunk>,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chunks: VecDeque::new(),
        }
    }

    /// Returns `false` if the buffer is already at capacity; the chunk is
    /// dropped in that case.
    pub fn push(&mut self, chunk: AudioChunk) -> bool {
        if self.chunks.len() >= self.capacity {
            return false;
        }
        self.chunks.push_back(chunk);
        true
    }

    /// Drains the buffer, returning concatenated PCM16 bytes ordered by
    /// `sequence`. Ties (duplicate sequences) keep arrival order.
    pub fn drain(&mut self) -> Vec<u8> {
        let mut ordered: Vec<AudioChunk> = self.chunks.drain(..).collect();
        ordered.sort_by_key(|c| c.sequence);
        ordered.into_iter().flat_map(|c| c.pcm16).collect()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.capacity
    }
}
