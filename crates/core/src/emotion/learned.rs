//! wav2vec2 speech-emotion model exported to ONNX, run with ort.
//!
//! The graph takes `input_values` shaped `[1, samples]` (16 kHz mono,
//! zero-mean/unit-variance) and returns one row of 8 logits in
//! [`Emotion::ALL`] order.

use crate::config::TARGET_SAMPLE_RATE;
use crate::emotion::{
    validate_samples, ClassificationError, ClassifierKind, Emotion, EmotionClassifier,
    EmotionScores, ModelLoadError,
};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INPUT_NAME: &str = "input_values";
const NORMALIZE_EPS: f32 = 1e-7;

pub struct OnnxEmotionModel {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    path: PathBuf,
}

impl OnnxEmotionModel {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(intra_threads.max(1))?))
            .and_then(|mut b| b.commit_from_file(path))
            .map_err(|e| ModelLoadError::Session {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::info!(model = %path.display(), "loaded emotion model");
        Ok(Self {
            session: Mutex::new(session),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn logits(&self, input: Array2<f32>) -> Result<Vec<f32>, ClassificationError> {
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| ClassificationError::Inference(format!("tensor creation: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassificationError::Inference("model session lock poisoned".to_owned()))?;
        let outputs = session
            .run(ort::inputs![INPUT_NAME => input_tensor])
            .map_err(|e| ClassificationError::Inference(e.to_string()))?;

        let (_, logits) = outputs
            .iter()
            .next()
            .ok_or_else(|| ClassificationError::Inference("model produced no output".to_owned()))?;
        let (_shape, data) = logits
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassificationError::Inference(format!("logit extraction: {e}")))?;
        Ok(data.to_vec())
    }
}

/// wav2vec2 feature-extractor normalisation.
fn zero_mean_unit_var(samples: &[f32]) -> Vec<f32> {
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let scale = 1.0 / (var + NORMALIZE_EPS).sqrt();
    samples.iter().map(|s| (s - mean) * scale).collect()
}

impl EmotionClassifier for OnnxEmotionModel {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Learned
    }

    fn classify(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<EmotionScores, ClassificationError> {
        validate_samples(samples)?;
        if sample_rate != TARGET_SAMPLE_RATE {
            return Err(ClassificationError::SampleRate {
                got: sample_rate,
                expected: TARGET_SAMPLE_RATE,
            });
        }

        let normalized = zero_mean_unit_var(samples);
        let input = Array2::from_shape_vec((1, normalized.len()), normalized)
            .map_err(|e| ClassificationError::Inference(format!("input shape: {e}")))?;
        let logits = self.logits(input)?;
        if logits.len() != Emotion::COUNT {
            return Err(ClassificationError::InvalidScores(format!(
                "model returned {} logits, expected {}",
                logits.len(),
                Emotion::COUNT
            )));
        }
        EmotionScores::softmax(&logits)
    }
}
