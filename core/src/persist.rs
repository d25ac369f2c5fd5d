use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use time::format_description::well_known::Rfc3339;

use crate::error::SinkError;
use crate::record::{validate_id, ScoredRecord, SentimentLabel, StoredRecord};

pub const STORE_VERSION: u32 = 1;
const RECORDS_TREE: &str = "records";
const META_KEY: &[u8] = b"meta";

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    pub fn add(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

/// Durable home for scored records, keyed by record id.
///
/// `upsert` must apply the whole slice atomically and overwrite existing ids,
/// so replaying a batch after a failure converges to the same state.
pub trait RecordStore: Send + Sync {
    fn upsert(&self, records: &[ScoredRecord]) -> Result<usize, SinkError>;
    fn get(&self, id: &str) -> Result<Option<StoredRecord>, SinkError>;
    fn len(&self) -> Result<usize, SinkError>;
    fn sentiment_counts(&self) -> Result<SentimentCounts, SinkError>;

    fn is_empty(&self) -> Result<bool, SinkError> {
        Ok(self.len()? == 0)
    }
}

/// Validate every id before anything is written.
fn to_rows(records: &[ScoredRecord]) -> Result<Vec<StoredRecord>, SinkError> {
    records
        .iter()
        .map(|r| -> Result<StoredRecord, SinkError> {
            validate_id(r.id()).map_err(|reason| SinkError::Schema { id: r.id().to_string(), reason })?;
            Ok(StoredRecord::from(r))
        })
        .collect()
}

/// Embedded on-disk store backed by a sled tree.
pub struct SledStore {
    db: sled::Db,
    records: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let db = sled::open(path.as_ref())?;
        Self::init(db)
    }

    /// A throwaway store removed on drop.
    pub fn temporary() -> Result<Self, SinkError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::init(db)
    }

    fn init(db: sled::Db) -> Result<Self, SinkError> {
        match db.get(META_KEY)? {
            Some(bytes) => {
                let meta: StoreMeta = serde_json::from_slice(&bytes)
                    .map_err(|e| SinkError::Unavailable(format!("corrupt store meta: {e}")))?;
                if meta.version != STORE_VERSION {
                    return Err(SinkError::Unavailable(format!(
                        "store version {} is not supported (expected {STORE_VERSION})",
                        meta.version
                    )));
                }
            }
            None => {
                let meta = StoreMeta {
                    version: STORE_VERSION,
                    created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into()),
                };
                let json = serde_json::to_vec_pretty(&meta).map_err(|e| SinkError::Unavailable(e.to_string()))?;
                db.insert(META_KEY, json)?;
            }
        }
        let records = db.open_tree(RECORDS_TREE)?;
        Ok(Self { db, records })
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn upsert(&self, records: &[ScoredRecord]) -> Result<usize, SinkError> {
        let rows = to_rows(records)?;
        let mut batch = sled::Batch::default();
        for row in &rows {
            batch.insert(row.id.as_bytes(), bincode::serialize(row)?);
        }
        self.records.apply_batch(batch)?;
        self.records.flush()?;
        Ok(rows.len())
    }

    fn get(&self, id: &str) -> Result<Option<StoredRecord>, SinkError> {
        match self.records.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn len(&self) -> Result<usize, SinkError> {
        Ok(self.records.len())
    }

    fn sentiment_counts(&self) -> Result<SentimentCounts, SinkError> {
        let mut counts = SentimentCounts::default();
        for item in self.records.iter() {
            let (_, bytes) = item?;
            let row: StoredRecord = bincode::deserialize(&bytes)?;
            counts.add(row.sentiment);
        }
        Ok(counts)
    }
}

/// In-process store with the same upsert semantics as [`SledStore`].
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&self, records: &[ScoredRecord]) -> Result<usize, SinkError> {
        let rows = to_rows(records)?;
        let n = rows.len();
        let mut guard = self.rows.lock();
        for row in rows {
            guard.insert(row.id.clone(), row);
        }
        Ok(n)
    }

    fn get(&self, id: &str) -> Result<Option<StoredRecord>, SinkError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    fn len(&self) -> Result<usize, SinkError> {
        Ok(self.rows.lock().len())
    }

    fn sentiment_counts(&self) -> Result<SentimentCounts, SinkError> {
        let mut counts = SentimentCounts::default();
        for row in self.rows.lock().values() {
            counts.add(row.sentiment);
        }
        Ok(counts)
    }
}
