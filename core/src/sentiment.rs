use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::record::SentimentLabel;

/// Saturation constant of the compound normalization.
pub const ALPHA: f64 = 15.0;
pub const DEFAULT_POSITIVE_THRESHOLD: f64 = 0.05;
pub const DEFAULT_NEGATIVE_THRESHOLD: f64 = -0.05;

const BUILTIN_LEXICON: &str = include_str!("../data/lexicon.tsv");

lazy_static! {
    static ref BUILTIN: HashMap<String, f64> =
        parse_lexicon(BUILTIN_LEXICON, Path::new("<builtin>")).expect("builtin lexicon is well formed");
}

/// Parse `token<TAB>valence[<TAB>...]` lines. Blank lines and `#` comments are skipped.
pub fn parse_lexicon(content: &str, origin: &Path) -> Result<HashMap<String, f64>, ConfigError> {
    let mut lexicon = HashMap::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let mut cols = line.split('\t');
        let token = cols.next().unwrap_or_default().trim();
        let valence = cols.next().map(str::trim).unwrap_or_default();
        let err = |reason: String| ConfigError::Lexicon { path: origin.to_path_buf(), line: idx + 1, reason };
        if token.is_empty() {
            return Err(err("empty token".into()));
        }
        let valence: f64 = valence.parse().map_err(|_| err(format!("invalid valence {valence:?}")))?;
        if !valence.is_finite() {
            return Err(err(format!("non-finite valence for {token:?}")));
        }
        lexicon.insert(token.to_lowercase(), valence);
    }
    Ok(lexicon)
}

/// Map a raw valence sum into (-1, 1).
pub fn normalize_score(sum: f64, alpha: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + alpha).sqrt()).clamp(-1.0, 1.0)
}

/// Threshold mapping; both bounds are inclusive.
pub fn label_for(compound: f64, positive_threshold: f64, negative_threshold: f64) -> SentimentLabel {
    if compound >= positive_threshold {
        SentimentLabel::Positive
    } else if compound <= negative_threshold {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

/// Lexicon-based polarity scorer. Holds only immutable state, so one instance
/// can score records from many threads at once.
#[derive(Debug, Clone)]
pub struct SentimentClassifier {
    lexicon: HashMap<String, f64>,
    positive_threshold: f64,
    negative_threshold: f64,
}

impl Default for SentimentClassifier {
    fn default() -> Self {
        Self::with_lexicon(BUILTIN.clone())
    }
}

impl SentimentClassifier {
    pub fn with_lexicon(lexicon: HashMap<String, f64>) -> Self {
        Self {
            lexicon,
            positive_threshold: DEFAULT_POSITIVE_THRESHOLD,
            negative_threshold: DEFAULT_NEGATIVE_THRESHOLD,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: PathBuf::from(path), source })?;
        let lexicon = parse_lexicon(&content, path)?;
        tracing::info!(path = %path.display(), entries = lexicon.len(), "loaded sentiment lexicon");
        Ok(Self::with_lexicon(lexicon))
    }

    pub fn with_thresholds(mut self, positive: f64, negative: f64) -> Self {
        self.positive_threshold = positive;
        self.negative_threshold = negative;
        self
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }

    pub fn valence(&self, token: &str) -> f64 {
        self.lexicon.get(token).copied().unwrap_or(0.0)
    }

    /// Compound score in [-1, 1]; empty input scores 0.
    pub fn score<S: AsRef<str>>(&self, tokens: &[S]) -> f64 {
        let sum: f64 = tokens.iter().map(|t| self.valence(t.as_ref())).sum();
        normalize_score(sum, ALPHA)
    }

    pub fn label(&self, compound: f64) -> SentimentLabel {
        label_for(compound, self.positive_threshold, self.negative_threshold)
    }

    pub fn classify<S: AsRef<str>>(&self, tokens: &[S]) -> (SentimentLabel, f64) {
        let compound = self.score(tokens);
        (self.label(compound), compound)
    }
}
