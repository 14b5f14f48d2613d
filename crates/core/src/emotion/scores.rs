use crate::emotion::{ClassificationError, Emotion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SUM_TOLERANCE: f32 = 1e-4;

/// A probability distribution over all eight labels.
///
/// Construction always normalises, so every value is in `[0, 1]` and the
/// values sum to 1 within float tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Emotion, f32>",
    into = "BTreeMap<Emotion, f32>"
)]
pub struct EmotionScores([f32; Emotion::COUNT]);

impl EmotionScores {
    /// Normalise non-negative weights in canonical label order.
    pub fn from_weights(weights: [f32; Emotion::COUNT]) -> Result<Self, ClassificationError> {
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ClassificationError::InvalidScores(format!(
                "weight {w} is negative or not finite"
            )));
        }
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ClassificationError::InvalidScores(
                "weights sum to zero".to_owned(),
            ));
        }
        Ok(Self(weights.map(|w| w / total)))
    }

    pub fn softmax(logits: &[f32]) -> Result<Self, ClassificationError> {
        if logits.len() != Emotion::COUNT {
            return Err(ClassificationError::InvalidScores(format!(
                "expected {} logits, got {}",
                Emotion::COUNT,
                logits.len()
            )));
        }
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(ClassificationError::InvalidScores(
                "logits contain a non-finite value".to_owned(),
            ));
        }
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut exp = [0.0f32; Emotion::COUNT];
        for (slot, l) in exp.iter_mut().zip(logits) {
            *slot = (l - max).exp();
        }
        Self::from_weights(exp)
    }

    pub fn one_hot(emotion: Emotion) -> Self {
        let mut values = [0.0; Emotion::COUNT];
        values[emotion.index()] = 1.0;
        Self(values)
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        self.0[emotion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().zip(self.0.iter().copied())
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Highest-scoring label; on a tie the earlier label in canonical order wins.
    pub fn argmax(&self) -> (Emotion, f32) {
        let mut best = (Emotion::ALL[0], self.0[0]);
        for (emotion, p) in self.iter().skip(1) {
            if p > best.1 {
                best = (emotion, p);
            }
        }
        best
    }
}

impl From<EmotionScores> for BTreeMap<Emotion, f32> {
    fn from(scores: EmotionScores) -> Self {
        scores.iter().collect()
    }
}

impl TryFrom<BTreeMap<Emotion, f32>> for EmotionScores {
    type Error = ClassificationError;

    fn try_from(map: BTreeMap<Emotion, f32>) -> Result<Self, Self::Error> {
        let mut values = [0.0f32; Emotion::COUNT];
        for emotion in Emotion::ALL {
            values[emotion.index()] = *map.get(&emotion).ok_or_else(|| {
                ClassificationError::InvalidScores(format!("missing label {emotion}"))
            })?;
        }
        let total: f32 = values.iter().sum();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(ClassificationError::InvalidScores(format!(
                "values sum to {total}, expected 1"
            )));
        }
        Self::from_weights(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_normalised() {
        let s = EmotionScores::from_weights([0.0, 0.0, 0.0, 0.4, 0.0, 0.4, 0.0, 0.0]).unwrap();
        assert!((s.sum() - 1.0).abs() < 1e-6);
        assert!((s.get(Emotion::Fearful) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn negative_or_zero_weights_rejected() {
        assert!(EmotionScores::from_weights([0.0; 8]).is_err());
        let mut w = [0.1; 8];
        w[2] = -0.1;
        assert!(EmotionScores::from_weights(w).is_err());
        w[2] = f32::NAN;
        assert!(EmotionScores::from_weights(w).is_err());
    }

    #[test]
    fn softmax_is_a_simplex_and_keeps_order() {
        let s = EmotionScores::softmax(&[1.0, 2.0, 0.5, -3.0, 4.0, 0.0, 1.0, 2.5]).unwrap();
        assert!((s.sum() - 1.0).abs() < 1e-5);
        assert!(s.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));
        assert_eq!(s.argmax().0, Emotion::Happy);
    }

    #[test]
    fn softmax_survives_large_logits() {
        let s = EmotionScores::softmax(&[1000.0, 999.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(s.iter().all(|(_, p)| p.is_finite()));
        assert_eq!(s.argmax().0, Emotion::Angry);
    }

    #[test]
    fn softmax_rejects_wrong_width() {
        assert!(EmotionScores::softmax(&[0.0; 7]).is_err());
    }

    #[test]
    fn argmax_tie_prefers_canonical_order() {
        let s = EmotionScores::from_weights([0.0, 0.0, 0.0, 0.5, 0.0, 0.5, 0.0, 0.0]).unwrap();
        assert_eq!(s.argmax().0, Emotion::Fearful);
    }

    #[test]
    fn serializes_all_eight_labels() {
        let json = serde_json::to_value(EmotionScores::one_hot(Emotion::Sad)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        assert_eq!(obj["sad"], 1.0);
        assert_eq!(obj["calm"], 0.0);
    }

    #[test]
    fn deserialize_requires_every_label() {
        let partial = r#"{"happy": 1.0}"#;
        assert!(serde_json::from_str::<EmotionScores>(partial).is_err());
        let full = serde_json::to_string(&EmotionScores::one_hot(Emotion::Calm)).unwrap();
        let back: EmotionScores = serde_json::from_str(&full).unwrap();
        assert_eq!(back.argmax().0, Emotion::Calm);
    }
}
