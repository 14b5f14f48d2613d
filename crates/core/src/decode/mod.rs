#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod native;

use crate::audio::{AudioBuffer, NormalizeError};
use crate::config::DecodeConfig;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegAudioDecoder;
pub use native::SymphoniaDecoder;

/// Audio handed to the analyzer by its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioInput {
    Path(PathBuf),
    Bytes {
        data: Bytes,
        format_hint: Option<String>,
    },
}

impl AudioInput {
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes<B: Into<Bytes>>(data: B, format_hint: Option<&str>) -> Self {
        Self::Bytes {
            data: data.into(),
            format_hint: format_hint.map(normalize_hint),
        }
    }

    /// Lowercased file extension (without the dot), when one is known.
    pub fn format_hint(&self) -> Option<String> {
        match self {
            Self::Path(p) => extension_of(p),
            Self::Bytes { format_hint, .. } => format_hint.clone(),
        }
    }

    pub(crate) fn hint_label(&self) -> String {
        self.format_hint().unwrap_or_else(|| "unknown".to_owned())
    }
}

fn normalize_hint(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_hint)
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("audio file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("unsupported audio format (hint: {hint}): {cause}")]
    UnsupportedFormat { hint: String, cause: String },

    #[error("corrupt or unreadable audio (hint: {hint}): {cause}")]
    Corrupt { hint: String, cause: String },

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl DecodeError {
    /// Errors a different decoder might still get past.
    pub fn is_format_problem(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. } | Self::Corrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait AudioDecoder: Send + Sync {
    fn decode(&self, input: AudioInput) -> BoxFuture<'_, Result<AudioBuffer>>;
}

/// Symphonia in-process, then ffmpeg for anything symphonia rejects.
#[derive(Clone, Debug)]
pub struct AutoDecoder {
    native: SymphoniaDecoder,
    #[cfg(feature = "ffmpeg")]
    ffmpeg: Option<FfmpegAudioDecoder>,
}

impl AutoDecoder {
    pub fn new(config: DecodeConfig) -> Self {
        #[cfg(feature = "ffmpeg")]
        {
            let ffmpeg = config
                .ffmpeg_fallback
                .then(|| FfmpegAudioDecoder::new(config.allow_ffmpeg_download));
            Self {
                native: SymphoniaDecoder,
                ffmpeg,
            }
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            if config.ffmpeg_fallback {
                tracing::debug!("ffmpeg fallback requested but the ffmpeg feature is disabled");
            }
            Self {
                native: SymphoniaDecoder,
            }
        }
    }
}

impl AudioDecoder for AutoDecoder {
    fn decode(&self, input: AudioInput) -> BoxFuture<'_, Result<AudioBuffer>> {
        async move {
            if let AudioInput::Path(path) = &input {
                if !path.exists() {
                    return Err(DecodeError::MissingFile(path.clone()));
                }
            }

            let native_err = match self.native.decode(input.clone()).await {
                Ok(buffer) => return Ok(buffer),
                Err(e) => e,
            };

            #[cfg(feature = "ffmpeg")]
            if native_err.is_format_problem() {
                if let Some(ffmpeg) = &self.ffmpeg {
                    tracing::info!(
                        hint = %input.hint_label(),
                        error = %native_err,
                        "native decode failed, trying ffmpeg"
                    );
                    match ffmpeg.decode(input).await {
                        Ok(buffer) => return Ok(buffer),
                        Err(e) => {
                            tracing::warn!(error = %e, "ffmpeg decode failed");
                        }
                    }
                }
            }

            Err(native_err)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_from_path_is_lowercased() {
        let input = AudioInput::path("/tmp/Voice.MP3");
        assert_eq!(input.format_hint().as_deref(), Some("mp3"));
    }

    #[test]
    fn hint_from_bytes_strips_dot() {
        let input = AudioInput::bytes(vec![0u8; 4], Some(".M4A"));
        assert_eq!(input.format_hint().as_deref(), Some("m4a"));
        let input = AudioInput::bytes(vec![0u8; 4], None);
        assert_eq!(input.hint_label(), "unknown");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let decoder = AutoDecoder::new(DecodeConfig::default());
        let err = decoder
            .decode(AudioInput::path("/definitely/not/here.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingFile(_)));
    }

    #[tokio::test]
    async fn garbage_bytes_fail_without_ffmpeg() {
        let decoder = AutoDecoder::new(DecodeConfig {
            ffmpeg_fallback: false,
            allow_ffmpeg_download: false,
        });
        let err = decoder
            .decode(AudioInput::bytes(b"not audio at all".to_vec(), Some("wav")))
            .await
            .unwrap_err();
        assert!(err.is_format_problem(), "{err}");
        assert!(err.to_string().contains("wav"));
    }
}
