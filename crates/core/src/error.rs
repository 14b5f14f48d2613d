use crate::chunk::ChunkError;
use crate::config::ConfigError;
use crate::decode::DecodeError;
use crate::emotion::ClassificationError;
use crate::timeline::EmptyTimeline;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of one analysis request.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("audio is empty (0 s)")]
    EmptyAudio,

    #[error("cannot chunk audio: {0}")]
    Chunking(ChunkError),

    #[error("classification failed for chunk at {start_time:.2} s: {source}")]
    Classification {
        start_time: f64,
        #[source]
        source: ClassificationError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("analysis cancelled")]
    Cancelled,
}

impl From<ChunkError> for AnalysisError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::EmptyAudio => Self::EmptyAudio,
            other => Self::Chunking(other),
        }
    }
}

impl From<EmptyTimeline> for AnalysisError {
    fn from(_: EmptyTimeline) -> Self {
        Self::EmptyAudio
    }
}

/// Stable machine-readable error names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeError,
    UnsupportedFormat,
    MissingFile,
    EmptyAudio,
    ClassificationError,
    ConfigError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::MissingFile => "missing_file",
            ErrorKind::EmptyAudio => "empty_audio",
            ErrorKind::ClassificationError => "classification_error",
            ErrorKind::ConfigError => "config_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// The request itself was bad (HTTP 400 class), as opposed to a
    /// failure inside decoding or classification.
    pub fn is_caller_fault(self) -> bool {
        matches!(
            self,
            ErrorKind::MissingFile
                | ErrorKind::UnsupportedFormat
                | ErrorKind::EmptyAudio
                | ErrorKind::ConfigError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Decode(DecodeError::MissingFile(_)) => ErrorKind::MissingFile,
            AnalysisError::Decode(DecodeError::UnsupportedFormat { .. }) => {
                ErrorKind::UnsupportedFormat
            }
            AnalysisError::Decode(_) | AnalysisError::Chunking(_) => ErrorKind::DecodeError,
            AnalysisError::EmptyAudio => ErrorKind::EmptyAudio,
            AnalysisError::Classification { .. } => ErrorKind::ClassificationError,
            AnalysisError::Config(_) => ErrorKind::ConfigError,
            AnalysisError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_caller_fault(&self) -> bool {
        self.kind().is_caller_fault()
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable `{kind, message}` object for callers at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AnalysisError> for ErrorReport {
    fn from(e: &AnalysisError) -> Self {
        e.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn kinds_follow_decode_variants() {
        let missing = AnalysisError::from(DecodeError::MissingFile(PathBuf::from("a.wav")));
        assert_eq!(missing.kind(), ErrorKind::MissingFile);
        assert!(missing.is_caller_fault());

        let unsupported = AnalysisError::from(DecodeError::UnsupportedFormat {
            hint: "xyz".into(),
            cause: "no reader".into(),
        });
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedFormat);
        assert!(unsupported.is_caller_fault());

        let corrupt = AnalysisError::from(DecodeError::Corrupt {
            hint: "mp3".into(),
            cause: "bad frame".into(),
        });
        assert_eq!(corrupt.kind(), ErrorKind::DecodeError);
        assert!(!corrupt.is_caller_fault());
    }

    #[test]
    fn empty_chunking_is_empty_audio() {
        let err = AnalysisError::from(ChunkError::EmptyAudio);
        assert_eq!(err.kind(), ErrorKind::EmptyAudio);
        assert!(err.is_caller_fault());
        assert_eq!(AnalysisError::from(EmptyTimeline).kind(), ErrorKind::EmptyAudio);
    }

    #[test]
    fn classification_is_server_side() {
        let err = AnalysisError::Classification {
            start_time: 6.0,
            source: ClassificationError::EmptyInput,
        };
        assert_eq!(err.kind(), ErrorKind::ClassificationError);
        assert!(!err.is_caller_fault());
        assert!(err.to_string().contains("6.00 s"));
    }

    #[test]
    fn config_errors_are_caller_faults() {
        let err = AnalysisError::from(ConfigError::InvalidChunkDuration(0.0));
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.is_caller_fault());
        assert!(!AnalysisError::Cancelled.is_caller_fault());
    }

    #[test]
    fn report_serializes_kind_and_message() {
        let report = AnalysisError::EmptyAudio.report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "empty_audio");
        assert_eq!(json["message"], "audio is empty (0 s)");
        for kind in [ErrorKind::DecodeError, ErrorKind::Cancelled, ErrorKind::MissingFile] {
            let s = serde_json::to_value(kind).unwrap();
            assert_eq!(s, kind.as_str());
        }
    }
}
