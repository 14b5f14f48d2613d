use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_CHUNK_DURATION_SECS: f64 = 3.0;
pub const DEFAULT_MIN_TRAILING_CHUNK_SECS: f64 = 0.5;
pub const DEFAULT_INTRA_THREADS: usize = 1;
pub const ENV_MODEL_PATH: &str = "EMOTION_MODEL_PATH";
pub const ENV_CHUNK_DURATION: &str = "EMOTION_CHUNK_DURATION";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChunkDuration(f64);

impl ChunkDuration {
    pub fn new(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidChunkDuration(secs));
        }
        Ok(Self(secs))
    }

    pub fn secs(&self) -> f64 {
        self.0
    }

    /// Number of samples in one full chunk, at least 1.
    pub fn samples_for_rate(&self, sample_rate_hz: u32) -> usize {
        let n = (self.0 * f64::from(sample_rate_hz)).round();
        (n as usize).max(1)
    }
}

impl Default for ChunkDuration {
    fn default() -> Self {
        Self(DEFAULT_CHUNK_DURATION_SECS)
    }
}

/// What to do with a final chunk shorter than the configured duration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum TrailingChunkPolicy {
    Keep,
    DropShorterThan(f64),
}

impl TrailingChunkPolicy {
    pub fn drop_shorter_than(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidTrailingMinimum(secs));
        }
        Ok(Self::DropShorterThan(secs))
    }

    pub fn keeps(&self, tail_secs: f64) -> bool {
        match *self {
            Self::Keep => true,
            Self::DropShorterThan(min) => tail_secs >= min,
        }
    }
}

impl Default for TrailingChunkPolicy {
    fn default() -> Self {
        Self::DropShorterThan(DEFAULT_MIN_TRAILING_CHUNK_SECS)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    pub duration: ChunkDuration,
    pub trailing: TrailingChunkPolicy,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Concurrency(usize);

impl Concurrency {
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self(workers))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub model_path: Option<PathBuf>,
    pub learned_enabled: bool,
    pub intra_threads: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            learned_enabled: true,
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodeConfig {
    pub ffmpeg_fallback: bool,
    pub allow_ffmpeg_download: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_fallback: true,
            allow_ffmpeg_download: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub chunking: ChunkingConfig,
    pub classifier: ClassifierConfig,
    pub decode: DecodeConfig,
    pub concurrency: Concurrency,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("chunk duration must be a finite number of seconds > 0, got {0}")]
    InvalidChunkDuration(f64),
    #[error("minimum trailing chunk length must be a finite number of seconds >= 0, got {0}")]
    InvalidTrailingMinimum(f64),
    #[error("concurrency must be >= 1")]
    ZeroConcurrency,
    #[error("timeout must be a finite number of seconds > 0, got {0}")]
    InvalidTimeout(f64),
    #[error("{key} is not a number: {value:?}")]
    NotANumber { key: String, value: String },
}

/// Per-request analysis deadline.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidTimeout(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs))
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_chunk_duration(
    cli_value: Option<f64>,
    env: &impl Env,
) -> Result<ChunkDuration, ConfigError> {
    match cli_value {
        Some(v) => ChunkDuration::new(v),
        None => match env.var(ENV_CHUNK_DURATION) {
            Some(raw) => {
                let secs = raw.trim().parse::<f64>().map_err(|_| ConfigError::NotANumber {
                    key: ENV_CHUNK_DURATION.to_owned(),
                    value: raw.clone(),
                })?;
                ChunkDuration::new(secs)
            }
            None => Ok(ChunkDuration::default()),
        },
    }
}

pub fn resolve_optional_path(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
) -> Option<PathBuf> {
    match cli_value {
        Some(v) => Some(v),
        None => env
            .var(env_key)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_rejects_non_positive() {
        assert!(ChunkDuration::new(0.0).is_err());
        assert!(ChunkDuration::new(-1.5).is_err());
        assert!(ChunkDuration::new(f64::NAN).is_err());
        assert!(ChunkDuration::new(f64::INFINITY).is_err());
        assert!(ChunkDuration::new(0.25).is_ok());
    }

    #[test]
    fn chunk_duration_samples_simple() {
        let d = ChunkDuration::default();
        assert_eq!(d.samples_for_rate(16_000), 48_000);
        let d = ChunkDuration::new(0.5).expect("positive");
        assert_eq!(d.samples_for_rate(16_000), 8_000);
    }

    #[test]
    fn trailing_policy_threshold() {
        let p = TrailingChunkPolicy::drop_shorter_than(0.5).expect("valid");
        assert!(p.keeps(0.5));
        assert!(p.keeps(1.0));
        assert!(!p.keeps(0.2));
        assert!(TrailingChunkPolicy::Keep.keeps(0.001));
        assert!(TrailingChunkPolicy::drop_shorter_than(-0.1).is_err());
    }

    #[test]
    fn chunk_duration_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_CHUNK_DURATION, "5.0");
        let d = resolve_chunk_duration(Some(2.0), &env).expect("valid");
        assert_eq!(d.secs(), 2.0);
    }

    #[test]
    fn chunk_duration_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_CHUNK_DURATION, " 1.5 ");
        let d = resolve_chunk_duration(None, &env).expect("valid");
        assert_eq!(d.secs(), 1.5);
    }

    #[test]
    fn chunk_duration_env_garbage_is_config_error() {
        let env = MapEnv::default().with_var(ENV_CHUNK_DURATION, "three");
        let err = resolve_chunk_duration(None, &env).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));
    }

    #[test]
    fn chunk_duration_default_used_when_both_missing() {
        let d = resolve_chunk_duration(None, &MapEnv::default()).expect("valid");
        assert_eq!(d.secs(), DEFAULT_CHUNK_DURATION_SECS);
    }

    #[test]
    fn model_path_ignores_blank_env() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "   ");
        assert_eq!(resolve_optional_path(None, ENV_MODEL_PATH, &env), None);
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/models/ser.onnx");
        assert_eq!(
            resolve_optional_path(None, ENV_MODEL_PATH, &env),
            Some(PathBuf::from("/models/ser.onnx"))
        );
    }

    #[test]
    fn timeout_must_be_positive() {
        assert_eq!(timeout_from_secs(1.5).unwrap(), Duration::from_millis(1_500));
        assert!(timeout_from_secs(0.0).is_err());
        assert!(timeout_from_secs(f64::NAN).is_err());
    }
}
