//! Synthetic test recordings: tone bursts whose pitch, pitch spread and
//! level loosely follow each emotion's prosody.

use anyhow::Context;
use emotion_timeline_core::config::TARGET_SAMPLE_RATE;
use emotion_timeline_core::emotion::Emotion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

const SEGMENT_SECS: f32 = 0.1;
const NOISE: f32 = 0.01;
const PEAK: f32 = 0.9;

#[derive(Clone, Copy, Debug)]
struct Voice {
    base_hz: f32,
    spread_hz: f32,
    amplitude: f32,
}

fn voice(emotion: Emotion) -> Voice {
    let (base_hz, spread_hz, amplitude) = match emotion {
        Emotion::Happy => (300.0, 50.0, 0.4),
        Emotion::Sad => (150.0, 10.0, 0.2),
        Emotion::Angry => (350.0, 80.0, 0.5),
        Emotion::Fearful => (280.0, 100.0, 0.35),
        _ => (200.0, 20.0, 0.3),
    };
    Voice {
        base_hz,
        spread_hz,
        amplitude,
    }
}

/// `secs` of audio at [`TARGET_SAMPLE_RATE`], one random pitch per 100 ms.
pub fn synthesize(emotion: Emotion, secs: f32, rng: &mut impl Rng) -> Vec<f32> {
    let v = voice(emotion);
    let rate = TARGET_SAMPLE_RATE as f32;
    let segment_len = (SEGMENT_SECS * rate) as usize;
    let segments = (secs / SEGMENT_SECS).round() as usize;

    let mut out = Vec::with_capacity(segments * segment_len);
    for _ in 0..segments {
        let hz = v.base_hz + rng.random_range(-v.spread_hz..=v.spread_hz);
        out.extend((0..segment_len).map(|i| {
            let tone = v.amplitude * (TAU * hz * i as f32 / rate).sin();
            tone + rng.random_range(-NOISE..=NOISE)
        }));
    }

    let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > PEAK {
        let gain = PEAK / peak;
        out.iter_mut().for_each(|s| *s *= gain);
    }
    out
}

pub fn synthesize_sequence(parts: &[(Emotion, f32)], rng: &mut impl Rng) -> Vec<f32> {
    parts
        .iter()
        .flat_map(|&(emotion, secs)| synthesize(emotion, secs, &mut *rng))
        .collect()
}

pub fn write_wav(path: &Path, samples: &[f32]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("create {}", path.display()))?;
    for s in samples {
        let pcm = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm)?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalize {}", path.display()))?;
    Ok(())
}

/// Single-emotion clips plus two mixed sequences. Returns the written paths.
pub fn write_sample_set(dir: &Path, seed: u64) -> anyhow::Result<Vec<PathBuf>> {
    use Emotion::*;

    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut written = Vec::new();

    for emotion in [Happy, Sad, Angry, Neutral, Fearful] {
        let path = dir.join(format!("sample_{emotion}.wav"));
        write_wav(&path, &synthesize(emotion, 10.0, &mut rng))?;
        written.push(path);
    }

    let sequences: [(&str, Vec<(Emotion, f32)>); 2] = [
        (
            "sample_mixed_emotions.wav",
            [Neutral, Happy, Angry, Sad, Fearful, Happy]
                .into_iter()
                .map(|e| (e, 3.0))
                .collect(),
        ),
        (
            "sample_conversation.wav",
            [Neutral, Happy, Happy, Angry, Angry, Sad, Neutral]
                .into_iter()
                .map(|e| (e, 2.0))
                .collect(),
        ),
    ];
    for (name, parts) in sequences {
        let path = dir.join(name);
        write_wav(&path, &synthesize_sequence(&parts, &mut rng))?;
        written.push(path);
    }

    Ok(written)
}
