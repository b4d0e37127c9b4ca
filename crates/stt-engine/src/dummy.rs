use async_trait::async_trait;

use crate::engine_trait::SttEngine;
use crate::error::SttEngineError;

/// Test/demo double: "transcribes" by returning the byte length of the
/// input as a decimal string. This is the engine end-to-end scenario 4
/// (§8) exercises, and is the reference adapter real engines are grounded
/// on — model loading and inference themselves are out of scope.
#[derive(Debug, Default)]
pub struct DummySttEngine;

#[async_trait]
impl SttEngine for DummySttEngine {
    async fn initialize(&self) -> Result<(), SttEngineError> {
        Ok(())
    }

    async fn transcribe(
        &self,
        pcm16_bytes: &[u8],
        _sample_rate: u32,
        _language: Option<&str>,
    ) -> Result<String, SttEngineError> {
        Ok(pcm16_bytes.len().to_string())
    }
}
