use crate::audio::AudioBuffer;
use crate::decode::{AudioDecoder, AudioInput, DecodeError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fs::File;
use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};

/// In-process decoder for WAV, MP3, FLAC, OGG/Vorbis and M4A/AAC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn decode_blocking(&self, input: &AudioInput) -> Result<AudioBuffer> {
        let hint_label = input.hint_label();
        let source: Box<dyn MediaSource> = match input {
            AudioInput::Path(path) => match File::open(path) {
                Ok(file) => Box::new(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(DecodeError::MissingFile(path.clone()));
                }
                Err(e) => {
                    return Err(DecodeError::Corrupt {
                        hint: hint_label,
                        cause: format!("open {}: {e}", path.display()),
                    });
                }
            },
            AudioInput::Bytes { data, .. } => Box::new(Cursor::new(data.clone())),
        };

        let mut hint = Hint::new();
        if let Some(ext) = input.format_hint() {
            hint.with_extension(&ext);
        }
        decode_stream(source, &hint, &hint_label)
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, input: AudioInput) -> BoxFuture<'_, Result<AudioBuffer>> {
        let this = *self;
        async move {
            let hint = input.hint_label();
            tokio::task::spawn_blocking(move || this.decode_blocking(&input))
                .await
                .map_err(|e| DecodeError::Corrupt {
                    hint,
                    cause: format!("decode task failed: {e}"),
                })?
        }
        .boxed()
    }
}

fn decode_stream(source: Box<dyn MediaSource>, hint: &Hint, hint_label: &str) -> Result<AudioBuffer> {
    let unsupported = |cause: String| DecodeError::UnsupportedFormat {
        hint: hint_label.to_owned(),
        cause,
    };
    let corrupt = |cause: String| DecodeError::Corrupt {
        hint: hint_label.to_owned(),
        cause,
    };

    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => unsupported(format!("probe: {what}")),
            other => corrupt(format!("probe: {other}")),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("no decodable audio track".to_owned()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => unsupported(format!("codec: {what}")),
            other => corrupt(format!("codec: {other}")),
        })?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    let mut last_skip: Option<String> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(corrupt(format!("packet read: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                skipped += 1;
                last_skip = Some(e.to_owned());
                continue;
            }
            Err(e) => return Err(corrupt(format!("decode: {e}"))),
        };

        let spec = *audio_buf.spec();
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }
        if channels.is_none() {
            channels = Some(spec.channels.count() as u16);
        }

        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    // Packets that all failed are corrupt input, not silence.
    if samples.is_empty() && skipped > 0 {
        return Err(corrupt(format!(
            "{skipped} packets failed to decode, last: {}",
            last_skip.as_deref().unwrap_or("unknown")
        )));
    }
    if skipped > 0 {
        tracing::warn!(skipped, "some packets failed to decode");
    }

    let sample_rate = sample_rate.ok_or_else(|| corrupt("missing sample rate".to_owned()))?;
    let channels = channels.unwrap_or(1).max(1);

    tracing::debug!(
        sample_rate,
        channels,
        samples = samples.len(),
        "decoded with symphonia"
    );
    Ok(AudioBuffer::new(samples, channels, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let v = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(v).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav_bytes() {
        let bytes = wav_bytes(22_050, 2, 22_050);
        let input = AudioInput::bytes(bytes, Some("wav"));
        let buf = SymphoniaDecoder.decode_blocking(&input).unwrap();
        assert_eq!(buf.sample_rate, 22_050);
        assert_eq!(buf.channels, 2);
        assert_eq!(buf.frames(), 22_050);
    }

    #[test]
    fn decodes_wav_file_without_hint() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(&wav_bytes(16_000, 1, 8_000)).unwrap();
        let buf = SymphoniaDecoder
            .decode_blocking(&AudioInput::path(file.path()))
            .unwrap();
        assert!(buf.is_normalized());
        assert_eq!(buf.frames(), 8_000);
    }

    /// MPEG-1 Layer III frames with a valid 128 kbps / 44.1 kHz header and
    /// pseudo-random payload.
    fn garbage_mp3(seed: u32, frames: usize) -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
        let mut out = Vec::with_capacity(frames * FRAME_LEN);
        for _ in 0..frames {
            out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
            for _ in 4..FRAME_LEN {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                out.push((state >> 24) as u8);
            }
        }
        out
    }

    #[test]
    fn undecodable_packets_are_corrupt_not_empty() {
        let mut corrupt = 0;
        for seed in 0..8 {
            let input = AudioInput::bytes(garbage_mp3(seed, 60), Some("mp3"));
            match SymphoniaDecoder.decode_blocking(&input) {
                Ok(buf) => assert!(!buf.samples.is_empty(), "seed {seed} decoded to nothing"),
                Err(err) => {
                    assert!(
                        matches!(err, DecodeError::Corrupt { ref hint, .. } if hint == "mp3"),
                        "seed {seed}: {err}"
                    );
                    let err = crate::error::AnalysisError::from(err);
                    assert_eq!(err.kind(), crate::error::ErrorKind::DecodeError);
                    assert!(!err.is_caller_fault());
                    corrupt += 1;
                }
            }
        }
        assert!(corrupt > 0);
    }

    #[test]
    fn zero_frame_wav_decodes_to_empty_buffer() {
        let input = AudioInput::bytes(wav_bytes(16_000, 1, 0), Some("wav"));
        let buf = SymphoniaDecoder.decode_blocking(&input).unwrap();
        assert!(buf.samples.is_empty());
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let input = AudioInput::bytes(vec![7u8; 512], Some("ogg"));
        let err = SymphoniaDecoder.decode_blocking(&input).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat { ref hint, .. } if hint == "ogg"));
    }
}
