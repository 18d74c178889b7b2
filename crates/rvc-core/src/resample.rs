//! Linear resampling, used at the boundaries where audio crosses between
//! the pipeline's fixed working sample rate and whatever rate a device or
//! external converter actually produced. Not a substitute for a proper
//! polyphase resampler — good enough for the boundary, never used inside
//! the hot path between `input_buf` and `output_buf`.

/// Resamples `input` from `from_rate` to `to_rate` with linear
/// interpolation. Returns `input` unchanged (cloned) if the rates match or
/// `input` is empty.
pub fn linear_resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || from_rate == 0 {
        return input.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let input = vec![1.0, 2.0, 3.0];
        assert_eq!(linear_resample(&input, 48_000, 48_000), input);
    }

    #[test]
    fn test_empty_input_stays_empty() {
        assert!(linear_resample(&[], 44_100, 48_000).is_empty());
    }

    #[test]
    fn test_upsampling_produces_more_samples() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let out = linear_resample(&input, 24_000, 48_000);
        assert!(out.len() > input.len());
    }

    #[test]
    fn test_downsampling_produces_fewer_samples() {
        let input = vec![0.0; 480];
        let out = linear_resample(&input, 48_000, 24_000);
        assert!(out.len() < input.len());
    }

    #[test]
    fn test_constant_signal_resamples_to_constant() {
        let input = vec![0.5; 100];
        let out = linear_resample(&input, 44_100, 48_000);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}
