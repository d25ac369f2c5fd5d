use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::normalizer::{Normalizer, DEFAULT_STOPWORDS};
use crate::retry::Backoff;
use crate::sentiment::{SentimentClassifier, DEFAULT_NEGATIVE_THRESHOLD, DEFAULT_POSITIVE_THRESHOLD};

pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3_600;

/// Everything the pipeline needs, passed in at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub max_batch_size: usize,
    pub max_batch_age_ms: u64,
    /// Pending-record capacity is `max_batch_size * buffer_capacity_factor`.
    pub buffer_capacity_factor: usize,
    pub window_secs: u64,
    pub top_k: usize,
    /// `None` selects the built-in English list.
    pub stopwords: Option<Vec<String>>,
    /// `None` selects the built-in lexicon.
    pub sentiment_lexicon_path: Option<PathBuf>,
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub stemming: bool,
    pub sink_timeout_ms: u64,
    pub sink_max_retries: u32,
    pub source_max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_batch_age_ms: 5_000,
            buffer_capacity_factor: 4,
            window_secs: 3_600,
            top_k: 10,
            stopwords: None,
            sentiment_lexicon_path: None,
            positive_threshold: DEFAULT_POSITIVE_THRESHOLD,
            negative_threshold: DEFAULT_NEGATIVE_THRESHOLD,
            stemming: false,
            sink_timeout_ms: 5_000,
            sink_max_retries: 5,
            source_max_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 10_000,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.max_batch_size == 0 {
            return invalid("max_batch_size must be positive");
        }
        if self.max_batch_age_ms == 0 {
            return invalid("max_batch_age_ms must be positive");
        }
        if self.buffer_capacity_factor == 0 {
            return invalid("buffer_capacity_factor must be positive");
        }
        if self.window_secs == 0 || self.window_secs > MAX_WINDOW_SECS {
            return invalid("window_secs must be positive and at most ten years");
        }
        if self.top_k == 0 {
            return invalid("top_k must be positive");
        }
        if self.sink_timeout_ms == 0 {
            return invalid("sink_timeout_ms must be positive");
        }
        if self.backoff_base_ms == 0 || self.backoff_max_ms < self.backoff_base_ms {
            return invalid("backoff_base_ms must be positive and not exceed backoff_max_ms");
        }
        // Inclusive thresholds must leave a compound of 0 neutral.
        if !(self.negative_threshold < 0.0 && self.positive_threshold > 0.0) {
            return invalid("thresholds must satisfy negative_threshold < 0 < positive_threshold");
        }
        if let Some(path) = &self.sentiment_lexicon_path {
            if !path.is_file() {
                return Err(ConfigError::Invalid(format!("sentiment lexicon {} does not exist", path.display())));
            }
        }
        Ok(())
    }

    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn sink_backoff(&self) -> Backoff {
        Backoff::new(Duration::from_millis(self.backoff_base_ms), Duration::from_millis(self.backoff_max_ms), self.sink_max_retries)
    }

    pub fn source_backoff(&self) -> Backoff {
        Backoff::new(Duration::from_millis(self.backoff_base_ms), Duration::from_millis(self.backoff_max_ms), self.source_max_retries)
    }

    pub fn normalizer(&self) -> Normalizer {
        match &self.stopwords {
            Some(words) => Normalizer::new(words.iter().cloned(), self.stemming),
            None => Normalizer::new(DEFAULT_STOPWORDS.iter().map(|s| s.to_string()), self.stemming),
        }
    }

    pub fn classifier(&self) -> Result<SentimentClassifier, ConfigError> {
        let classifier = match &self.sentiment_lexicon_path {
            Some(path) => SentimentClassifier::from_path(path)?,
            None => SentimentClassifier::default(),
        };
        Ok(classifier.with_thresholds(self.positive_threshold, self.negative_threshold))
    }
}
