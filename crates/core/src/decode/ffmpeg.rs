use crate::audio::AudioBuffer;
use crate::config::TARGET_SAMPLE_RATE;
use crate::decode::{AudioDecoder, AudioInput, DecodeError, Result};
use ffmpeg_sidecar::{command::ffmpeg_is_installed, download, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Decodes anything ffmpeg understands straight to 16 kHz mono f32.
#[derive(Clone, Debug)]
pub struct FfmpegAudioDecoder {
    allow_download: bool,
    staging_dir: Option<PathBuf>,
}

impl FfmpegAudioDecoder {
    pub fn new(allow_download: bool) -> Self {
        Self {
            allow_download,
            staging_dir: None,
        }
    }

    /// Stage in-memory input under `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Write `data` to a temp file that is removed when the handle drops.
    ///
    /// Containers like M4A keep their index at the end, so ffmpeg needs a
    /// seekable file rather than a pipe.
    async fn stage(&self, data: &[u8], format_hint: Option<&str>) -> Result<NamedTempFile> {
        let suffix = format_hint.map(|ext| format!(".{ext}")).unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("emotion-timeline-").suffix(&suffix);
        let staged = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| DecodeError::FfmpegFailed(format!("temp file: {e}")))?;
        tokio::fs::write(staged.path(), data)
            .await
            .map_err(|e| DecodeError::FfmpegFailed(format!("temp file: {e}")))?;
        Ok(staged)
    }

    fn ensure_ffmpeg_available(&self) -> Result<()> {
        if ffmpeg_is_installed() {
            return Ok(());
        }
        if !self.allow_download {
            return Err(DecodeError::FfmpegUnavailable(
                "ffmpeg not found and downloading is disabled".to_owned(),
            ));
        }
        download::auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    pub(crate) fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
        if !raw.len().is_multiple_of(4usize) {
            return Err(DecodeError::InvalidPcm(format!(
                "f32le byte length must be multiple of 4, got {}",
                raw.len()
            )));
        }
        let mut out = Vec::with_capacity(raw.len() / 4);
        for chunk in raw.chunks_exact(4) {
            out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(out)
    }

    async fn decode_file(&self, path: &Path) -> Result<Vec<f32>> {
        let rate = TARGET_SAMPLE_RATE.to_string();
        let output = tokio::process::Command::new(ffmpeg_path())
            .arg("-hide_banner")
            .arg("-nostdin")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .args(["-vn", "-sn", "-dn"])
            .args(["-ac", "1"])
            .args(["-ar", rate.as_str()])
            .args(["-f", "f32le", "-acodec", "pcm_f32le"])
            .arg("pipe:1")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr_s = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={stderr_s}",
                output.status.code()
            )));
        }

        Self::parse_f32le_mono(&output.stdout)
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&self, input: AudioInput) -> BoxFuture<'_, Result<AudioBuffer>> {
        let this = self.clone();
        async move {
            this.ensure_ffmpeg_available()?;
            let samples = match &input {
                AudioInput::Path(path) => this.decode_file(path).await?,
                AudioInput::Bytes { data, format_hint } => {
                    let staged = this.stage(data, format_hint.as_deref()).await?;
                    this.decode_file(staged.path()).await?
                }
            };
            tracing::debug!(samples = samples.len(), "decoded with ffmpeg");
            Ok(AudioBuffer::mono(samples, TARGET_SAMPLE_RATE))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_f32le_rejects_non_multiple_of_4() {
        let err = FfmpegAudioDecoder::parse_f32le_mono(&[0, 1, 2]).unwrap_err();
        let s = err.to_string();
        assert!(s.contains("multiple of 4"));
    }

    #[test]
    fn parse_f32le_reads_little_endian() {
        let mut raw = Vec::new();
        for f in [0.0f32, -0.5f32, 1.0f32] {
            raw.extend_from_slice(&f.to_le_bytes());
        }
        let out = FfmpegAudioDecoder::parse_f32le_mono(&raw).unwrap();
        assert_eq!(out, vec![0.0, -0.5, 1.0]);
    }

    fn wav_bytes(seconds: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..seconds * 8_000 {
                writer
                    .write_sample(((i as f32 * 0.1).sin() * 4_000.0) as i16)
                    .unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = FfmpegAudioDecoder::new(false).with_staging_dir(dir.path());
        let staged = decoder.stage(b"abc", Some("m4a")).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("m4a"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        drop(staged);
        assert!(!path.exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn unavailable_ffmpeg_stages_nothing() {
        if ffmpeg_is_installed() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let decoder = FfmpegAudioDecoder::new(false).with_staging_dir(dir.path());
        let err = decoder
            .decode(AudioInput::bytes(vec![0u8; 64], Some("m4a")))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::FfmpegUnavailable(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    #[ignore]
    async fn staged_input_is_cleaned_up_after_ffmpeg() {
        // Requires an ffmpeg binary on PATH.
        let dir = tempfile::tempdir().unwrap();
        let decoder = FfmpegAudioDecoder::new(false).with_staging_dir(dir.path());

        let err = decoder
            .decode(AudioInput::bytes(vec![0u8; 64], Some("m4a")))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::FfmpegFailed(_)));
        assert!(dir_is_empty(dir.path()));

        let buf = decoder
            .decode(AudioInput::bytes(wav_bytes(2), Some("wav")))
            .await
            .unwrap();
        assert!(buf.is_normalized());
        assert!(!buf.samples.is_empty());
        assert!(dir_is_empty(dir.path()));
    }
}
