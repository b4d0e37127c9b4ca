use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Resamples mono float32 audio to `dst_rate` using a windowed-sinc rational
/// resampler (§4.5 step 4 — any equal-quality resampler is acceptable; the
/// reference implementation's `audioop.ratecv` is replaced by `rubato` here).
pub fn resample_mono(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = dst_rate as f64 / src_rate as f64;
    let mut resampler = match SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1) {
        Ok(r) => r,
        Err(_) => return linear_fallback(samples, src_rate, dst_rate),
    };

    match resampler.process(&[samples.to_vec()], None) {
        Ok(mut out) => out.remove(0),
        Err(_) => linear_fallback(samples, src_rate, dst_rate),
    }
}

fn linear_fallback(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    let ratio = dst_rate as f64 / src_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        if idx + 1 >= samples.len() {
            out.push(*samples.last().unwrap_or(&0.0));
        } else {
            let frac = (src_pos - idx as f64) as f32;
            out.push(samples[idx] + (samples[idx + 1] - samples[idx]) * frac);
        }
    }
    out
}
