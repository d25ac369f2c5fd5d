use pulse_core::persist::{MemoryStore, RecordStore, SledStore};
use pulse_core::record::{NormalizedRecord, RawRecord, ScoredRecord, SentimentLabel};
use pulse_core::SinkError;
use tempfile::tempdir;

fn scored(id: &str, text: &str, label: SentimentLabel, compound: f64) -> ScoredRecord {
    let raw = RawRecord::new(id, text);
    ScoredRecord {
        record: NormalizedRecord {
            tokens: text.split_whitespace().map(str::to_string).collect(),
            normalized_text: text.to_string(),
            raw,
        },
        label,
        compound,
    }
}

fn batch(ids: std::ops::Range<u32>) -> Vec<ScoredRecord> {
    ids.map(|i| scored(&i.to_string(), "steady news", SentimentLabel::Neutral, 0.0)).collect()
}

fn exercise_idempotent_upserts(store: &dyn RecordStore) {
    store.upsert(&batch(0..60)).unwrap();
    store.upsert(&batch(40..100)).unwrap();
    store.upsert(&batch(0..100)).unwrap();
    store.upsert(&batch(90..100)).unwrap();
    assert_eq!(store.len().unwrap(), 100);
}

fn exercise_overwrite(store: &dyn RecordStore) {
    store.upsert(&[scored("42", "old take", SentimentLabel::Negative, -0.4)]).unwrap();
    store.upsert(&[scored("42", "great take", SentimentLabel::Positive, 0.6)]).unwrap();
    let row = store.get("42").unwrap().unwrap();
    assert_eq!(row.normalized_text, "great take");
    assert_eq!(row.sentiment, SentimentLabel::Positive);
    assert_eq!(row.compound, 0.6);
    assert_eq!(store.len().unwrap(), 1);
    assert!(store.get("missing").unwrap().is_none());
}

fn exercise_schema_rejection(store: &dyn RecordStore) {
    let mut records = batch(0..5);
    records.push(scored("bad id", "x", SentimentLabel::Neutral, 0.0));
    let err = store.upsert(&records).unwrap_err();
    assert!(matches!(err, SinkError::Schema { ref id, .. } if id == "bad id"));
    assert!(!err.is_retryable());
    // nothing from the rejected batch was written
    assert_eq!(store.len().unwrap(), 0);
}

#[test]
fn memory_store_upserts_are_idempotent() {
    exercise_idempotent_upserts(&MemoryStore::new());
}

#[test]
fn memory_store_overwrites_by_id() {
    exercise_overwrite(&MemoryStore::new());
}

#[test]
fn memory_store_rejects_bad_ids_atomically() {
    exercise_schema_rejection(&MemoryStore::new());
}

#[test]
fn sled_store_upserts_are_idempotent() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().join("records")).unwrap();
    exercise_idempotent_upserts(&store);
}

#[test]
fn sled_store_overwrites_by_id() {
    exercise_overwrite(&SledStore::temporary().unwrap());
}

#[test]
fn sled_store_rejects_bad_ids_atomically() {
    exercise_schema_rejection(&SledStore::temporary().unwrap());
}

#[test]
fn sentiment_counts_reflect_latest_rows() {
    let store = SledStore::temporary().unwrap();
    store
        .upsert(&[
            scored("1", "love it", SentimentLabel::Positive, 0.6),
            scored("2", "hate it", SentimentLabel::Negative, -0.6),
            scored("3", "fine", SentimentLabel::Neutral, 0.0),
        ])
        .unwrap();
    store.upsert(&[scored("3", "love it", SentimentLabel::Positive, 0.6)]).unwrap();
    let counts = store.sentiment_counts().unwrap();
    assert_eq!((counts.positive, counts.neutral, counts.negative), (2, 0, 1));
    assert_eq!(counts.total(), 3);
}
