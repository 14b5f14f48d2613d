use serde::{Deserialize, Serialize};

const FRAME_SECS: f32 = 0.04;
const HOP_SECS: f32 = 0.01;
const MIN_PITCH_HZ: f32 = 60.0;
const MAX_PITCH_HZ: f32 = 400.0;
const VOICED_RMS: f32 = 0.01;
const VOICED_CORRELATION: f32 = 0.3;
const OCTAVE_TOLERANCE: f32 = 0.9;

/// Prosodic summary of one chunk.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AcousticFeatures {
    /// Mean squared amplitude over the whole chunk.
    pub energy: f32,
    /// Mean per-frame zero-crossing rate, crossings per sample.
    pub zero_crossing_rate: f32,
    /// Mean F0 of voiced frames in Hz, 0 when nothing is voiced.
    pub pitch_mean: f32,
    /// Population standard deviation of voiced-frame F0 in Hz.
    pub pitch_std: f32,
}

impl AcousticFeatures {
    pub fn extract(samples: &[f32], sample_rate: u32) -> Self {
        if samples.is_empty() || sample_rate == 0 {
            return Self::default();
        }
        let energy = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;

        let frame_len = ((FRAME_SECS * sample_rate as f32) as usize).max(2);
        let hop = ((HOP_SECS * sample_rate as f32) as usize).max(1);

        let mut zcr_sum = 0.0f32;
        let mut frames = 0usize;
        let mut pitches = Vec::new();
        for frame in frames_of(samples, frame_len, hop) {
            zcr_sum += zero_crossing_rate(frame);
            frames += 1;
            if let Some(f0) = estimate_pitch(frame, sample_rate) {
                pitches.push(f0);
            }
        }
        let zero_crossing_rate = if frames == 0 {
            0.0
        } else {
            zcr_sum / frames as f32
        };

        let (pitch_mean, pitch_std) = mean_std(&pitches);
        Self {
            energy,
            zero_crossing_rate,
            pitch_mean,
            pitch_std,
        }
    }
}

/// Frames of `frame_len` every `hop`; a chunk shorter than one frame is one frame.
fn frames_of(samples: &[f32], frame_len: usize, hop: usize) -> impl Iterator<Item = &[f32]> {
    let count = if samples.len() <= frame_len {
        1
    } else {
        (samples.len() - frame_len) / hop + 1
    };
    (0..count).map(move |i| {
        let start = i * hop;
        &samples[start..(start + frame_len).min(samples.len())]
    })
}

fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

/// Normalised autocorrelation peak between `MIN_PITCH_HZ` and `MAX_PITCH_HZ`.
fn estimate_pitch(frame: &[f32], sample_rate: u32) -> Option<f32> {
    let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
    if rms < VOICED_RMS {
        return None;
    }

    let rate = sample_rate as f32;
    let min_lag = (rate / MAX_PITCH_HZ).floor().max(1.0) as usize;
    let max_lag = ((rate / MIN_PITCH_HZ).ceil() as usize).min(frame.len() / 2);
    if min_lag >= max_lag {
        return None;
    }

    let corr: Vec<f32> = (min_lag..=max_lag)
        .map(|lag| normalized_correlation(frame, lag))
        .collect();
    let best = corr.iter().copied().fold(0.0f32, f32::max);
    if best < VOICED_CORRELATION {
        return None;
    }

    // Multiples of the period correlate almost as well as the period itself;
    // take the first local peak close to the best one.
    let threshold = best * OCTAVE_TOLERANCE;
    let pick = (0..corr.len()).find(|&i| {
        let left = if i == 0 { f32::MIN } else { corr[i - 1] };
        let right = corr.get(i + 1).copied().unwrap_or(f32::MIN);
        corr[i] >= threshold && corr[i] >= left && corr[i] >= right
    })?;
    Some(rate / (min_lag + pick) as f32)
}

fn normalized_correlation(frame: &[f32], lag: usize) -> f32 {
    let head = &frame[..frame.len() - lag];
    let tail = &frame[lag..];
    let mut cross = 0.0f32;
    let mut e_head = 0.0f32;
    let mut e_tail = 0.0f32;
    for (a, b) in head.iter().zip(tail) {
        cross += a * b;
        e_head += a * a;
        e_tail += b * b;
    }
    let denom = (e_head * e_tail).sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    cross / denom
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var.sqrt())
}
