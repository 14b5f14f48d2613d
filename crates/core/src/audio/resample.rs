use crate::audio::NormalizeError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const CHUNK_FRAMES: usize = 1024;

/// Sinc-resample a mono signal.
///
/// The output holds exactly `round(len * to / from)` frames: the filter delay
/// is trimmed from the front and the tail is flushed, so the resampled signal
/// spans the same duration as the input.
pub fn resample_mono(input: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, NormalizeError> {
    if from_hz == 0 || to_hz == 0 {
        return Err(NormalizeError::InvalidFormat("sample rate is 0".to_owned()));
    }
    if input.is_empty() || from_hz == to_hz {
        return Ok(input.to_vec());
    }

    let ratio = f64::from(to_hz) / f64::from(from_hz);
    let expected = (input.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1)
        .map_err(|e| NormalizeError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut out = Vec::with_capacity(wanted + CHUNK_FRAMES);

    let mut pos = 0usize;
    loop {
        let need = resampler.input_frames_next();
        if pos + need > input.len() {
            break;
        }
        let wave_in = [&input[pos..pos + need]];
        let block = resampler
            .process(&wave_in[..], None)
            .map_err(|e| NormalizeError::Resample(e.to_string()))?;
        out.extend_from_slice(&block[0]);
        pos += need;
    }

    if pos < input.len() {
        let wave_in = [&input[pos..]];
        let block = resampler
            .process_partial(Some(&wave_in[..]), None)
            .map_err(|e| NormalizeError::Resample(e.to_string()))?;
        out.extend_from_slice(&block[0]);
    }

    while out.len() < wanted {
        let block = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| NormalizeError::Resample(e.to_string()))?;
        if block[0].is_empty() {
            break;
        }
        out.extend_from_slice(&block[0]);
    }

    let mut trimmed = out.split_off(delay.min(out.len()));
    trimmed.resize(expected, 0.0);
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate_is_passthrough() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&input, 16_000, 16_000).unwrap(), input);
    }

    #[test]
    fn downsample_48k_length_matches_duration() {
        let input = vec![0.25f32; 48_000 * 3 + 123];
        let out = resample_mono(&input, 48_000, 16_000).unwrap();
        let expected = ((48_000 * 3 + 123) as f64 / 3.0).round() as usize;
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn upsample_keeps_dc_level() {
        let input = vec![0.5f32; 8_000];
        let out = resample_mono(&input, 8_000, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
        // Away from the edges a constant signal stays constant.
        let mid = &out[4_000..12_000];
        assert!(mid.iter().all(|s| (s - 0.5).abs() < 0.02));
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(resample_mono(&[0.0], 0, 16_000).is_err());
    }
}
