const HEADROOM: f32 = 0.97;

/// Equal-power crossfade joining `a`'s tail into `b`'s head (§4.5). Returns
/// the concatenated signal; `a` and `b` are consumed by value to avoid an
/// extra copy of the non-overlapping regions.
pub fn equal_power_crossfade(a: &[f32], b: &[f32], sample_rate: u32, crossfade_ms: u64) -> Vec<f32> {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }

    let requested = ((sample_rate as u64 * crossfade_ms) / 1000).max(1) as usize;
    let n = requested.min(a.len()).min(b.len());

    let mut out = Vec::with_capacity(a.len() + b.len() - n);
    out.extend_from_slice(&a[..a.len() - n]);

    for i in 0..n {
        let t = (i as f32 / n.max(1) as f32) * std::f32::consts::FRAC_PI_2;
        let win_out = t.cos().powi(2);
        let win_in = t.sin().powi(2);
        let mixed = (a[a.len() - n + i] * win_out + b[i] * win_in) * HEADROOM;
        out.push(mixed);
    }

    out.extend_from_slice(&b[n..]);
    out
}

/// Converts clamped float32 mono samples to PCM16 without peak normalization
/// (§4.5 step 6 — loudness is left to the caller).
pub fn to_pcm_s16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_a_returns_b_unchanged() {
        let b = vec![0.5, 0.5, 0.5];
        assert_eq!(equal_power_crossfade(&[], &b, 16_000, 100), b);
    }

    #[test]
    fn empty_b_returns_a_unchanged() {
        let a = vec![0.5, 0.5, 0.5];
        assert_eq!(equal_power_crossfade(&a, &[], 16_000, 100), a);
    }

    #[test]
    fn output_length_matches_concatenation_minus_overlap() {
        let a = vec![1.0; 1000];
        let b = vec![1.0; 1000];
        let sr = 16_000;
        let ms = 100;
        let n = ((sr as u64 * ms) / 1000) as usize;
        let out = equal_power_crossfade(&a, &b, sr, ms);
        assert_eq!(out.len(), a.len() + b.len() - n);
    }

    #[test]
    fn crossfade_window_preserves_constant_signal_energy_with_headroom() {
        let a = vec![1.0; 4_410];
        let b = vec![1.0; 4_410];
        let out = equal_power_crossfade(&a, &b, 44_100, 100);
        let mid = out[a.len() - 200];
        assert!((mid - HEADROOM).abs() < 0.05, "mid sample {mid} should be near headroom level");
    }

    #[test]
    fn clamps_out_of_range_samples_to_pcm16() {
        let pcm = to_pcm_s16(&[2.0, -2.0, 0.0]);
        assert_eq!(pcm[0], i16::MAX);
        assert_eq!(pcm[2], 0);
    }

    #[test]
    fn short_segments_shrink_the_crossfade_window() {
        let a = vec![1.0; 5];
        let b = vec![1.0; 5];
        let out = equal_power_crossfade(&a, &b, 16_000, 100);
        assert_eq!(out.len(), 5);
    }
}
