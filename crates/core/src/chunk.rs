use crate::audio::AudioBuffer;
use crate::config::{ChunkingConfig, TrailingChunkPolicy};
use std::ops::Range;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("audio is empty (0 s)")]
    EmptyAudio,

    #[error("chunking needs mono audio, got {0} channels")]
    NotMono(u16),

    #[error("sample rate must be > 0")]
    ZeroSampleRate,
}

/// One time slice of the normalised waveform.
///
/// Chunks share the waveform through an `Arc`, so they are cheap to move
/// onto worker threads.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub sample_rate: u32,
    audio: Arc<[f32]>,
    range: Range<usize>,
}

impl Chunk {
    pub fn samples(&self) -> &[f32] {
        &self.audio[self.range.clone()]
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Lazy, one-shot sequence of [`Chunk`]s in ascending `start_time` order.
#[derive(Debug)]
pub struct Chunks {
    audio: Arc<[f32]>,
    sample_rate: u32,
    chunk_len: usize,
    next_start: usize,
    next_index: usize,
    planned: usize,
}

impl Chunks {
    pub fn new(buffer: AudioBuffer, config: &ChunkingConfig) -> Result<Self, ChunkError> {
        if buffer.channels != 1 {
            return Err(ChunkError::NotMono(buffer.channels));
        }
        if buffer.sample_rate == 0 {
            return Err(ChunkError::ZeroSampleRate);
        }
        if buffer.samples.is_empty() {
            return Err(ChunkError::EmptyAudio);
        }

        let sample_rate = buffer.sample_rate;
        let chunk_len = config.duration.samples_for_rate(sample_rate);
        let total = buffer.samples.len();
        let planned = planned_chunks(total, chunk_len, sample_rate, config.trailing);

        Ok(Self {
            audio: buffer.samples.into(),
            sample_rate,
            chunk_len,
            next_start: 0,
            next_index: 0,
            planned,
        })
    }

    /// Duration in seconds of the audio that was handed in.
    pub fn audio_duration(&self) -> f64 {
        self.audio.len() as f64 / f64::from(self.sample_rate)
    }

    fn time_of(&self, sample: usize) -> f64 {
        sample as f64 / f64::from(self.sample_rate)
    }
}

/// Full chunks, plus the remainder unless the policy drops it. The first
/// chunk is always kept so short recordings still produce a result.
fn planned_chunks(
    total: usize,
    chunk_len: usize,
    sample_rate: u32,
    trailing: TrailingChunkPolicy,
) -> usize {
    let full = total / chunk_len;
    let remainder = total % chunk_len;
    if remainder == 0 {
        return full;
    }
    let tail_secs = remainder as f64 / f64::from(sample_rate);
    if full == 0 || trailing.keeps(tail_secs) {
        full + 1
    } else {
        tracing::debug!(tail_secs, "dropping short trailing chunk");
        full
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_index >= self.planned {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.chunk_len).min(self.audio.len());
        let chunk = Chunk {
            index: self.next_index,
            start_time: self.time_of(start),
            end_time: self.time_of(end),
            sample_rate: self.sample_rate,
            audio: Arc::clone(&self.audio),
            range: start..end,
        };
        self.next_start = end;
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.planned - self.next_index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks {}
