mod features;
mod heuristic;
#[cfg(feature = "onnx")]
mod learned;
mod scores;
mod slot;

use crate::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use features::AcousticFeatures;
pub use heuristic::RuleBasedClassifier;
#[cfg(feature = "onnx")]
pub use learned::OnnxEmotionModel;
pub use scores::EmotionScores;
pub use slot::ClassifierSlot;

const LOG_TARGET: &str = "emotion::classifier";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Calm,
    Disgust,
    Fearful,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Emotion {
    /// Canonical label order; also the output order of the learned model.
    pub const ALL: [Emotion; 8] = [
        Emotion::Angry,
        Emotion::Calm,
        Emotion::Disgust,
        Emotion::Fearful,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprised,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Calm => "calm",
            Emotion::Disgust => "disgust",
            Emotion::Fearful => "fearful",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == lower)
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

/// Which classifier variant produced the scores. Confidence from the
/// rule-based variant is a heuristic weight, not a calibrated probability.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Learned,
    RuleBased,
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassifierKind::Learned => "learned",
            ClassifierKind::RuleBased => "rule_based",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("chunk has no samples")]
    EmptyInput,

    #[error("chunk contains a non-finite sample at index {0}")]
    NonFiniteSample(usize),

    #[error("unsupported sample rate {got} Hz (expected {expected} Hz)")]
    SampleRate { got: u32, expected: u32 },

    #[error("scores are not a probability distribution: {0}")]
    InvalidScores(String),

    #[error("model inference failed: {0}")]
    Inference(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("learned classifier disabled by configuration")]
    Disabled,

    #[error("learned classifier not compiled in (build with the `onnx` feature)")]
    NotCompiled,

    #[error("no model path configured")]
    NoModelPath,

    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to load model {}: {reason}", .path.display())]
    Session { path: PathBuf, reason: String },
}

pub trait EmotionClassifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    fn classify(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<EmotionScores, ClassificationError>;
}

/// Rejects input neither variant can score.
pub(crate) fn validate_samples(samples: &[f32]) -> Result<(), ClassificationError> {
    if samples.is_empty() {
        return Err(ClassificationError::EmptyInput);
    }
    if let Some(idx) = samples.iter().position(|s| !s.is_finite()) {
        return Err(ClassificationError::NonFiniteSample(idx));
    }
    Ok(())
}

pub enum Classifier {
    #[cfg(feature = "onnx")]
    Learned(OnnxEmotionModel),
    RuleBased(RuleBasedClassifier),
}

impl EmotionClassifier for Classifier {
    fn kind(&self) -> ClassifierKind {
        match self {
            #[cfg(feature = "onnx")]
            Classifier::Learned(_) => ClassifierKind::Learned,
            Classifier::RuleBased(_) => ClassifierKind::RuleBased,
        }
    }

    fn classify(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<EmotionScores, ClassificationError> {
        match self {
            #[cfg(feature = "onnx")]
            Classifier::Learned(model) => model.classify(samples, sample_rate),
            Classifier::RuleBased(rules) => rules.classify(samples, sample_rate),
        }
    }
}

pub fn load_classifier(config: &ClassifierConfig) -> Result<Classifier, ModelLoadError> {
    if !config.learned_enabled {
        return Err(ModelLoadError::Disabled);
    }
    #[cfg(feature = "onnx")]
    {
        let path = config.model_path.as_ref().ok_or(ModelLoadError::NoModelPath)?;
        let model = OnnxEmotionModel::load(path, config.intra_threads)?;
        Ok(Classifier::Learned(model))
    }
    #[cfg(not(feature = "onnx"))]
    {
        Err(ModelLoadError::NotCompiled)
    }
}

/// Load the learned model, or fall back to the rule-based variant.
pub fn select_classifier(config: &ClassifierConfig) -> Classifier {
    match load_classifier(config) {
        Ok(classifier) => {
            tracing::info!(target: LOG_TARGET, kind = %classifier.kind(), "emotion classifier ready");
            classifier
        }
        Err(ModelLoadError::Disabled) => {
            tracing::info!(target: LOG_TARGET, "learned model disabled, using rule-based classifier");
            Classifier::RuleBased(RuleBasedClassifier::new())
        }
        Err(e) => {
            tracing::warn!(
                target: LOG_TARGET,
                error = %e,
                "learned emotion model unavailable, falling back to rule-based classifier"
            );
            Classifier::RuleBased(RuleBasedClassifier::new())
        }
    }
}
