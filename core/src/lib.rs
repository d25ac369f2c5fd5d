pub mod buffer;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod sentiment;
pub mod source;
pub mod trending;

pub use buffer::{ingestion_buffer, Batch, BatchReceiver, BufferHandle, CloseReason};
pub use config::PipelineConfig;
pub use error::{BufferError, ConfigError, MalformedRecord, PipelineError, SinkError, SourceError};
pub use normalizer::{normalize, Normalized, Normalizer};
pub use persist::{MemoryStore, RecordStore, SentimentCounts, SledStore};
pub use pipeline::{Pipeline, PipelineReport, Scorer, SinkWriter};
pub use record::{IncomingRecord, NormalizedRecord, RawRecord, ScoredRecord, SentimentLabel, StoredRecord};
pub use sentiment::SentimentClassifier;
pub use source::{FilteredSource, JsonlSource, KeywordFilter, Pulled, RecordSource, VecSource};
pub use trending::{SharedTrends, TopTerm, TrendingTerms, WindowStats};
