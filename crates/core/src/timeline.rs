//! Temporal aggregation over ordered chunk results.
//!
//! Everything here is a pure function of the result slice: change events come
//! from one left-to-right scan, statistics from one accumulation pass plus a
//! final normalisation for the percentages.

use crate::emotion::{Emotion, EmotionScores};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub start_time: f64,
    pub end_time: f64,
    pub emotion: Emotion,
    pub confidence: f32,
    pub all_scores: EmotionScores,
}

impl ChunkResult {
    pub fn from_scores(start_time: f64, end_time: f64, scores: EmotionScores) -> Self {
        let (emotion, confidence) = scores.argmax();
        Self {
            start_time,
            end_time,
            emotion,
            confidence,
            all_scores: scores,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionChange {
    pub timestamp: f64,
    pub from_emotion: Emotion,
    pub to_emotion: Emotion,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_duration: f64,
    pub emotion_counts: BTreeMap<Emotion, usize>,
    pub emotion_durations: BTreeMap<Emotion, f64>,
    pub emotion_percentages: BTreeMap<Emotion, f64>,
    pub dominant_emotion: Emotion,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no chunk results to aggregate")]
pub struct EmptyTimeline;

pub fn detect_changes(results: &[ChunkResult]) -> Vec<EmotionChange> {
    let mut changes = Vec::new();
    let Some(first) = results.first() else {
        return changes;
    };
    let mut previous = first.emotion;
    for result in &results[1..] {
        if result.emotion != previous {
            changes.push(EmotionChange {
                timestamp: result.start_time,
                from_emotion: previous,
                to_emotion: result.emotion,
                confidence: result.confidence,
            });
            previous = result.emotion;
        }
    }
    changes
}

pub fn compute_statistics(results: &[ChunkResult]) -> Result<Statistics, EmptyTimeline> {
    let last = results.last().ok_or(EmptyTimeline)?;
    let total_duration = last.end_time;

    let mut emotion_counts = BTreeMap::new();
    let mut emotion_durations = BTreeMap::new();
    let mut first_seen = Vec::new();
    for result in results {
        let count = emotion_counts.entry(result.emotion).or_insert(0usize);
        if *count == 0 {
            first_seen.push(result.emotion);
        }
        *count += 1;
        *emotion_durations.entry(result.emotion).or_insert(0.0) += result.duration();
    }

    let emotion_percentages = emotion_durations
        .iter()
        .map(|(&emotion, &secs)| {
            let pct = if total_duration > 0.0 {
                100.0 * secs / total_duration
            } else {
                0.0
            };
            (emotion, pct)
        })
        .collect();

    // Strictly greater keeps the earliest label on ties.
    let mut dominant_emotion = first_seen[0];
    let mut best = 0usize;
    for emotion in first_seen {
        let count = emotion_counts[&emotion];
        if count > best {
            best = count;
            dominant_emotion = emotion;
        }
    }

    Ok(Statistics {
        total_duration,
        emotion_counts,
        emotion_durations,
        emotion_percentages,
        dominant_emotion,
    })
}

pub fn aggregate(results: &[ChunkResult]) -> Result<(Vec<EmotionChange>, Statistics), EmptyTimeline> {
    let statistics = compute_statistics(results)?;
    Ok((detect_changes(results), statistics))
}

/// `MM:SS`, truncating fractional seconds. Minutes are not wrapped at 60.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(labels: &[Emotion], step: f64) -> Vec<ChunkResult> {
        labels
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let start = i as f64 * step;
                let mut weights = [0.05f32; Emotion::COUNT];
                weights[e.index()] = 0.65;
                let scores = EmotionScores::from_weights(weights).unwrap();
                ChunkResult::from_scores(start, start + step, scores)
            })
            .collect()
    }

    #[test]
    fn fifteen_second_scenario() {
        use Emotion::*;
        let results = timeline(&[Neutral, Happy, Happy, Angry, Sad], 3.0);
        let (changes, stats) = aggregate(&results).unwrap();

        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.timestamp, c.from_emotion, c.to_emotion))
            .collect();
        assert_eq!(
            summary,
            vec![(3.0, Neutral, Happy), (9.0, Happy, Angry), (12.0, Angry, Sad)]
        );
        assert_eq!(
            stats.emotion_counts,
            BTreeMap::from([(Neutral, 1), (Happy, 2), (Angry, 1), (Sad, 1)])
        );
        assert_eq!(stats.dominant_emotion, Happy);
        assert_eq!(stats.total_duration, 15.0);
        assert!((stats.emotion_percentages[&Happy] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn change_carries_new_chunk_confidence() {
        let mut results = timeline(&[Emotion::Calm, Emotion::Sad], 2.0);
        results[1].confidence = 0.77;
        let changes = detect_changes(&results);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].confidence, 0.77);
    }

    #[test]
    fn sums_hold() {
        use Emotion::*;
        let mut results = timeline(&[Sad, Sad, Calm, Fearful, Calm, Calm], 3.0);
        results.last_mut().unwrap().end_time = 16.4;
        let (changes, stats) = aggregate(&results).unwrap();

        let differing = results.windows(2).filter(|w| w[0].emotion != w[1].emotion).count();
        assert_eq!(changes.len(), differing);
        assert!(changes.len() <= results.len() - 1);
        assert_eq!(stats.emotion_counts.values().sum::<usize>(), results.len());
        let secs: f64 = stats.emotion_durations.values().sum();
        assert!((secs - stats.total_duration).abs() < 1e-9);
        let pct: f64 = stats.emotion_percentages.values().sum();
        assert!((pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn dominant_tie_goes_to_first_appearance() {
        use Emotion::*;
        // Surprised sorts after angry but appears first.
        let results = timeline(&[Surprised, Angry, Angry, Surprised], 1.0);
        assert_eq!(compute_statistics(&results).unwrap().dominant_emotion, Surprised);

        let results = timeline(&[Angry, Surprised, Surprised, Angry], 1.0);
        assert_eq!(compute_statistics(&results).unwrap().dominant_emotion, Angry);
    }

    #[test]
    fn single_chunk_has_no_changes() {
        let results = timeline(&[Emotion::Disgust], 3.0);
        let (changes, stats) = aggregate(&results).unwrap();
        assert!(changes.is_empty());
        assert_eq!(stats.dominant_emotion, Emotion::Disgust);
        assert_eq!(stats.emotion_percentages[&Emotion::Disgust], 100.0);
    }

    #[test]
    fn aggregation_is_idempotent() {
        use Emotion::*;
        let results = timeline(&[Happy, Neutral, Happy, Fearful], 0.7);
        let a = aggregate(&results).unwrap();
        let b = aggregate(&results).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a.1).unwrap(), serde_json::to_string(&b.1).unwrap());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(aggregate(&[]), Err(EmptyTimeline));
        assert!(detect_changes(&[]).is_empty());
    }

    #[test]
    fn result_fields_follow_scores() {
        let results = timeline(&[Emotion::Fearful], 3.0);
        let r = &results[0];
        let max = r.all_scores.iter().map(|(_, p)| p).fold(0.0f32, f32::max);
        assert_eq!(r.confidence, max);
        assert_eq!(r.emotion, Emotion::Fearful);
    }

    #[test]
    fn statistics_serialize_with_label_keys() {
        let results = timeline(&[Emotion::Neutral, Emotion::Happy], 3.0);
        let json = serde_json::to_value(compute_statistics(&results).unwrap()).unwrap();
        assert_eq!(json["emotion_counts"]["happy"], 1);
        assert_eq!(json["dominant_emotion"], "neutral");
    }

    #[test]
    fn timestamps_format_as_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(9.9), "00:09");
        assert_eq!(format_timestamp(75.0), "01:15");
        assert_eq!(format_timestamp(3_600.0), "60:00");
        assert_eq!(format_timestamp(-2.0), "00:00");
    }
}
