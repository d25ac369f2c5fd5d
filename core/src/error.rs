use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures returned by the ingestion buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("ingestion buffer is closed")]
    Closed,
    #[error("ingestion buffer is full ({capacity} records pending)")]
    Backpressure { capacity: usize },
}

/// Failures returned by a persistence store.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("persistence store unavailable: {0}")]
    Unavailable(String),
    #[error("record id {id:?} is invalid: {reason}")]
    Schema { id: String, reason: &'static str },
    #[error("persistence write timed out after {0:?}")]
    Timeout(Duration),
}

impl SinkError {
    /// Schema errors are deterministic; retrying the same batch cannot succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SinkError::Schema { .. })
    }
}

impl From<sled::Error> for SinkError {
    fn from(err: sled::Error) -> Self {
        SinkError::Unavailable(err.to_string())
    }
}

impl From<bincode::Error> for SinkError {
    fn from(err: bincode::Error) -> Self {
        SinkError::Unavailable(format!("row encoding: {err}"))
    }
}

/// Failures surfaced by an ingestion source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("ingestion source is rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("ingestion source closed unexpectedly: {0}")]
    Closed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}

/// A raw record that cannot be admitted; logged and skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("unparseable record: {0}")]
    Unparseable(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("lexicon {path} line {line}: {reason}")]
    Lexicon {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Fatal errors that stop the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ingestion failed: {0}")]
    Ingestion(#[source] SourceError),
    #[error("persistence failed after {attempts} attempts: {source}")]
    Sink {
        attempts: u32,
        #[source]
        source: SinkError,
    },
    #[error("pipeline task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) => 2,
            _ => 1,
        }
    }
}
