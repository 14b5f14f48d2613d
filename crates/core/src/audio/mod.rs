mod resample;

use crate::config::TARGET_SAMPLE_RATE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use resample::resample_mono;

/// Decoded PCM, interleaved when `channels > 1`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("resampling failed: {0}")]
    Resample(String),
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.sample_rate, self.frames())
    }

    pub fn is_normalized(&self) -> bool {
        self.channels == 1 && self.sample_rate == TARGET_SAMPLE_RATE
    }

    /// Downmix to one channel, resample to [`TARGET_SAMPLE_RATE`] and clamp
    /// every sample to [-1, 1].
    pub fn normalize(self) -> Result<AudioBuffer, NormalizeError> {
        if self.channels == 0 {
            return Err(NormalizeError::InvalidFormat("channel count is 0".to_owned()));
        }
        if self.sample_rate == 0 {
            return Err(NormalizeError::InvalidFormat("sample rate is 0".to_owned()));
        }

        let source_rate = self.sample_rate;
        let mono = if self.channels == 1 {
            self.samples
        } else {
            downmix(&self.samples, self.channels)
        };
        let mut out = if source_rate == TARGET_SAMPLE_RATE {
            mono
        } else {
            tracing::debug!(
                from_hz = source_rate,
                to_hz = TARGET_SAMPLE_RATE,
                frames = mono.len(),
                "resampling"
            );
            resample_mono(&mono, source_rate, TARGET_SAMPLE_RATE)?
        };
        // Float sources and sinc overshoot can both exceed full scale.
        for s in &mut out {
            *s = s.clamp(-1.0, 1.0);
        }
        Ok(AudioBuffer::mono(out, TARGET_SAMPLE_RATE))
    }
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels);
    if ch <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / ch as f32;
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

pub fn duration_from_frames(sample_rate_hz: u32, frames: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
