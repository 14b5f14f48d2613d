use crate::audio::{AudioBuffer, NormalizeError};
use crate::chunk::{Chunk, Chunks};
use crate::config::{AnalysisConfig, ChunkDuration, ChunkingConfig};
use crate::decode::{AudioDecoder, AudioInput, AutoDecoder, DecodeError};
use crate::emotion::{ClassificationError, ClassifierKind, EmotionClassifier};
use crate::error::AnalysisError;
use crate::timeline::{self, ChunkResult, EmotionChange, Statistics};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Full result of one analysis request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub results: Vec<ChunkResult>,
    pub emotion_changes: Vec<EmotionChange>,
    pub statistics: Statistics,
    /// Variant that produced the scores; confidence semantics differ.
    pub classifier: ClassifierKind,
}

/// External abort for a running analysis. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs decode, normalise, chunk, classify and aggregate for one input.
///
/// The classifier is injected and may be shared between analyzers; nothing
/// else is shared between requests.
#[derive(Clone)]
pub struct Analyzer {
    decoder: Arc<dyn AudioDecoder>,
    classifier: Arc<dyn EmotionClassifier>,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig, classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self {
            decoder: Arc::new(AutoDecoder::new(config.decode)),
            classifier,
            config,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier.kind()
    }

    pub async fn analyze(
        &self,
        input: AudioInput,
        chunk_duration: Option<ChunkDuration>,
        cancel: &CancelSignal,
    ) -> Result<AnalysisReport, AnalysisError> {
        cancel.check()?;
        let hint = input.hint_label();
        let decoded = self.decoder.decode(input).await?;
        tracing::debug!(
            hint = %hint,
            channels = decoded.channels,
            sample_rate = decoded.sample_rate,
            frames = decoded.frames(),
            "decoded audio"
        );
        self.analyze_buffer(decoded, chunk_duration, cancel).await
    }

    /// Same as [`Analyzer::analyze`] for samples the caller already decoded.
    pub async fn analyze_buffer(
        &self,
        buffer: AudioBuffer,
        chunk_duration: Option<ChunkDuration>,
        cancel: &CancelSignal,
    ) -> Result<AnalysisReport, AnalysisError> {
        cancel.check()?;
        let normalized = tokio::task::spawn_blocking(move || buffer.normalize())
            .await
            .map_err(|e| NormalizeError::Resample(format!("normalize task failed: {e}")))
            .and_then(|r| r)
            .map_err(DecodeError::from)?;

        let chunking = ChunkingConfig {
            duration: chunk_duration.unwrap_or(self.config.chunking.duration),
            trailing: self.config.chunking.trailing,
        };
        let chunks = Chunks::new(normalized, &chunking)?;
        let workers = self.config.concurrency.get();
        tracing::info!(
            duration_secs = chunks.audio_duration(),
            chunks = chunks.len(),
            chunk_secs = chunking.duration.secs(),
            workers,
            classifier = %self.classifier.kind(),
            "analyzing audio"
        );

        // `buffered` yields in input order, so results stay sorted by start_time.
        let results: Vec<ChunkResult> = stream::iter(chunks)
            .map(|chunk| {
                let classifier = Arc::clone(&self.classifier);
                let cancel = cancel.clone();
                async move {
                    cancel.check()?;
                    classify_chunk(classifier, chunk).await
                }
            })
            .buffered(workers)
            .try_collect()
            .await?;

        let (emotion_changes, statistics) = timeline::aggregate(&results)?;
        tracing::info!(
            chunks = results.len(),
            changes = emotion_changes.len(),
            dominant = %statistics.dominant_emotion,
            "analysis complete"
        );
        Ok(AnalysisReport {
            results,
            emotion_changes,
            statistics,
            classifier: self.classifier.kind(),
        })
    }
}

async fn classify_chunk(
    classifier: Arc<dyn EmotionClassifier>,
    chunk: Chunk,
) -> Result<ChunkResult, AnalysisError> {
    let start_time = chunk.start_time;
    let end_time = chunk.end_time;
    let scored = tokio::task::spawn_blocking(move || {
        classifier.classify(chunk.samples(), chunk.sample_rate)
    })
    .await
    .map_err(|e| ClassificationError::Inference(format!("classifier task failed: {e}")))
    .and_then(|r| r);

    match scored {
        Ok(scores) => Ok(ChunkResult::from_scores(start_time, end_time, scores)),
        Err(source) => {
            tracing::warn!(start_time, error = %source, "chunk classification failed");
            Err(AnalysisError::Classification { start_time, source })
        }
    }
}
