use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::TtsEngineError;

/// Encodes mono f32 samples in `[-1, 1]` as a PCM16 mono WAV (§3 `TTSResult` invariant).
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TtsEngineError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| TtsEngineError::Synthesis(format!("wav writer init failed: {e}")))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let scaled = (clamped * i16::MAX as f32) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| TtsEngineError::Synthesis(format!("wav write failed: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| TtsEngineError::Synthesis(format!("wav finalize failed: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Decodes a PCM16 mono WAV back to f32 samples in `[-1, 1]`, used by the
/// staged pipeline to bring engine output into a common domain for resampling.
pub fn decode_wav_pcm16(bytes: &[u8]) -> Result<(Vec<f32>, u32), TtsEngineError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| TtsEngineError::Synthesis(format!("wav reader init failed: {e}")))?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let samples: Result<Vec<f32>, _> = reader
        .samples::<i16>()
        .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
        .collect();
    let samples = samples.map_err(|e| TtsEngineError::Synthesis(format!("wav sample read failed: {e}")))?;
    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_riff_wave_header() {
        let bytes = encode_wav_pcm16(&[0.0, 0.5, -0.5], 22_050).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn round_trips_through_decode() {
        let samples = vec![0.0, 0.25, -0.25, 0.9, -0.9];
        let encoded = encode_wav_pcm16(&samples, 16_000).unwrap();
        let (decoded, sr) = decode_wav_pcm16(&encoded).unwrap();
        assert_eq!(sr, 16_000);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 0.01, "{a} vs {b}");
        }
    }

    #[test]
    fn clamps_out_of_range_samples() {
        let bytes = encode_wav_pcm16(&[2.0, -2.0], 8_000).unwrap();
        let (decoded, _) = decode_wav_pcm16(&bytes).unwrap();
        assert!((decoded[0] - 1.0).abs() < 0.01);
        assert!((decoded[1] + 1.0).abs() < 0.01);
    }
}
