use crate::emotion::{
    validate_samples, AcousticFeatures, ClassificationError, ClassifierKind, Emotion,
    EmotionClassifier, EmotionScores,
};

const HIGH_ENERGY: f32 = 0.5;
const LOW_ENERGY: f32 = 0.2;
const VARIED_PITCH_STD_HZ: f32 = 50.0;
const LOW_PITCH_HZ: f32 = 150.0;
const NOISY_ZCR: f32 = 0.1;

/// Deterministic prosody rules; used when no learned model can be loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn score_features(&self, features: &AcousticFeatures) -> EmotionScores {
        let mut weights = [0.0f32; Emotion::COUNT];
        let mut set = |e: Emotion, w: f32| weights[e.index()] = w;

        if features.energy > HIGH_ENERGY {
            if features.pitch_std > VARIED_PITCH_STD_HZ {
                set(Emotion::Angry, 0.4);
                set(Emotion::Surprised, 0.3);
            } else {
                set(Emotion::Happy, 0.5);
            }
        } else if features.energy < LOW_ENERGY {
            if features.pitch_mean < LOW_PITCH_HZ {
                set(Emotion::Sad, 0.6);
            } else {
                set(Emotion::Neutral, 0.5);
            }
        } else {
            // Fearful stays just under neutral: a tie would resolve to
            // fearful by label order, and mid-energy speech reads as neutral.
            if features.zero_crossing_rate > NOISY_ZCR {
                set(Emotion::Fearful, 0.35);
            }
            set(Emotion::Neutral, 0.4);
        }

        EmotionScores::from_weights(weights)
            .unwrap_or_else(|_| EmotionScores::one_hot(Emotion::Neutral))
    }
}

impl EmotionClassifier for RuleBasedClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RuleBased
    }

    fn classify(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<EmotionScores, ClassificationError> {
        validate_samples(samples)?;
        let features = AcousticFeatures::extract(samples, sample_rate);
        tracing::trace!(
            energy = features.energy,
            zcr = features.zero_crossing_rate,
            pitch_mean = features.pitch_mean,
            pitch_std = features.pitch_std,
            "acoustic features"
        );
        Ok(self.score_features(&features))
    }
}
