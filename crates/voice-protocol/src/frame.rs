//! Binary audio frame codec.
//!
//! ```text
//! offset  size  field
//! 0       1     stream_id_length L
//! 1       L     stream_id (UTF-8)
//! 1+L     4     sequence (big-endian uint32)
//! 5+L     8     timestamp (big-endian IEEE-754 float64 seconds)
//! 13+L    ...   PCM16 little-endian mono samples
//! ```

use thiserror::Error;

pub const HEADER_MIN_LEN: usize = 13;
pub const MAX_STREAM_ID_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than header")]
    TooShort,
    #[error("stream id longer than {MAX_STREAM_ID_LEN} bytes")]
    StreamIdTooLong,
    #[error("pcm payload length {0} is not a multiple of {1}")]
    InvalidPcmLength(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub stream_id: String,
    pub sequence: u32,
    pub timestamp: f64,
    pub pcm16: Vec<u8>,
}

impl AudioFrame {
    /// Encodes the frame per the wire layout above.
    pub fn build(stream_id: &str, sequence: u32, timestamp: f64, pcm16: &[u8]) -> Result<Vec<u8>, FrameError> {
        let sid_bytes = stream_id.as_bytes();
        if sid_bytes.len() > MAX_STREAM_ID_LEN {
            return Err(FrameError::StreamIdTooLong);
        }
        let mut out = Vec::with_capacity(HEADER_MIN_LEN + sid_bytes.len() + pcm16.len());
        out.push(sid_bytes.len() as u8);
        out.extend_from_slice(sid_bytes);
        out.extend_from_slice(&sequence.to_be_bytes());
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.extend_from_slice(pcm16);
        Ok(out)
    }

    /// Parses a frame, validating header length and optionally PCM alignment.
    ///
    /// `bytes_per_frame` is `2 * channels`; pass `None` to skip the alignment check
    /// (some callers validate alignment separately against a negotiated stream rate).
    pub fn parse(bytes: &[u8], bytes_per_frame: Option<usize>) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_MIN_LEN {
            return Err(FrameError::TooShort);
        }
        let len = bytes[0] as usize;
        if 1 + len > bytes.len() || 1 + len + 12 > bytes.len() {
            return Err(FrameError::TooShort);
        }
        let stream_id = String::from_utf8_lossy(&bytes[1..1 + len]).into_owned();
        let mut off = 1 + len;
        let sequence = u32::from_be_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let timestamp = f64::from_be_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let pcm16 = bytes[off..].to_vec();

        if let Some(bpf) = bytes_per_frame {
            if bpf > 0 && pcm16.len() % bpf != 0 {
                return Err(FrameError::InvalidPcmLength(pcm16.len(), bpf));
            }
        }

        Ok(AudioFrame {
            stream_id,
            sequence,
            timestamp,
            pcm16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let built = AudioFrame::build("s1", 42, 1.5, &[0x01, 0x00, 0x02, 0x00]).unwrap();
        let parsed = AudioFrame::parse(&built, Some(2)).unwrap();
        assert_eq!(parsed.stream_id, "s1");
        assert_eq!(parsed.sequence, 42);
        assert_eq!(parsed.timestamp, 1.5);
        assert_eq!(parsed.pcm16, vec![0x01, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn round_trip_empty_stream_id() {
        let built = AudioFrame::build("", 0, 0.0, &[]).unwrap();
        let parsed = AudioFrame::parse(&built, None).unwrap();
        assert_eq!(parsed.stream_id, "");
        assert_eq!(parsed.sequence, 0);
        assert!(parsed.pcm16.is_empty());
    }

    #[test]
    fn too_short_frame() {
        let err = AudioFrame::parse(&[0x00], None).unwrap_err();
        assert_eq!(err, FrameError::TooShort);
    }

    #[test]
    fn header_claims_more_than_available() {
        // length byte says 5 but only one byte of id follows.
        let bytes = [5u8, b'a'];
        let err = AudioFrame::parse(&bytes, None).unwrap_err();
        assert_eq!(err, FrameError::TooShort);
    }

    #[test]
    fn odd_pcm_length_rejected() {
        let built = AudioFrame::build("s1", 0, 0.0, &[0x01, 0x00, 0x02]).unwrap();
        let err = AudioFrame::parse(&built, Some(2)).unwrap_err();
        assert_eq!(err, FrameError::InvalidPcmLength(3, 2));
    }

    #[test]
    fn max_stream_id_length_round_trips() {
        let sid: String = std::iter::repeat('a').take(MAX_STREAM_ID_LEN).collect();
        let built = AudioFrame::build(&sid, 1, 0.0, &[]).unwrap();
        let parsed = AudioFrame::parse(&built, None).unwrap();
        assert_eq!(parsed.stream_id, sid);
    }

    #[test]
    fn oversized_stream_id_rejected() {
        let sid: String = std::iter::repeat('a').take(MAX_STREAM_ID_LEN + 1).collect();
        let err = AudioFrame::build(&sid, 0, 0.0, &[]).unwrap_err();
        assert_eq!(err, FrameError::StreamIdTooLong);
    }
}
