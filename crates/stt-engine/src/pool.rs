use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::instrument;

use crate::engine_trait::SttEngine;
use crate::error::SttEngineError;

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A fixed-size pool of `transcribe` slots in front of one engine instance
/// (§4.8). Each permit models one worker processing a call to completion
/// before taking the next; the Stream Manager's own bounded queue in front
/// of this pool is what applies real backpressure.
pub struct SttWorkerPool {
    engine: Arc<dyn SttEngine>,
    limiter: Arc<Semaphore>,
    workers: usize,
}

impl SttWorkerPool {
    pub fn new(engine: Arc<dyn SttEngine>, workers: Option<usize>) -> Self {
        let workers = workers.unwrap_or_else(default_worker_count).max(1);
        Self {
            engine,
            limiter: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    #[instrument(skip(self, pcm16_bytes))]
    pub async fn transcribe(
        &self,
        pcm16_bytes: &[u8],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<String, SttEngineError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("stt worker pool semaphore closed unexpectedly");
        self.engine.transcribe(pcm16_bytes, sample_rate, language).await
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummySttEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatches_to_the_wrapped_engine() {
        let pool = SttWorkerPool::new(Arc::new(DummySttEngine), Some(2));
        let transcript = pool.transcribe(&[0, 0], 16_000, None).await.unwrap();
        assert_eq!(transcript, "2");
        assert_eq!(pool.worker_count(), 2);
    }

    #[tokio::test]
    async fn defaults_to_available_parallelism_when_unset() {
        let pool = SttWorkerPool::new(Arc::new(DummySttEngine), None);
        assert!(pool.worker_count() >= 1);
    }

    #[tokio::test]
    async fn a_single_worker_serializes_concurrent_calls() {
        struct SlowEngine;
        #[async_trait::async_trait]
        impl SttEngine for SlowEngine {
            async fn initialize(&self) -> Result<(), SttEngineError> {
                Ok(())
            }
            async fn transcribe(
                &self,
                _pcm16_bytes: &[u8],
                _sample_rate: u32,
                _language: Option<&str>,
            ) -> Result<String, SttEngineError> {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("done".to_string())
            }
        }

        let pool = Arc::new(SttWorkerPool::new(Arc::new(SlowEngine), Some(1)));
        let start = std::time::Instant::now();
        let a = pool.clone();
        let b = pool.clone();
        let (r1, r2) = tokio::join!(
            a.transcribe(&[], 16_000, None),
            b.transcribe(&[], 16_000, None)
        );
        assert!(r1.is_ok() && r2.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(35));
    }
}
