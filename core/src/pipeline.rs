use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::buffer::{ingestion_buffer, Batch, BatchReceiver, BufferHandle, CloseReason};
use crate::config::PipelineConfig;
use crate::error::{BufferError, PipelineError, SinkError, SourceError};
use crate::normalizer::Normalizer;
use crate::persist::RecordStore;
use crate::record::{NormalizedRecord, RawRecord, ScoredRecord};
use crate::retry::Backoff;
use crate::sentiment::SentimentClassifier;
use crate::source::{Pulled, RecordSource};
use crate::trending::SharedTrends;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub batches: u64,
    pub size_batches: u64,
    pub age_batches: u64,
    pub shutdown_batches: u64,
    pub records: u64,
    pub persisted: u64,
    pub skipped: u64,
    pub sink_retries: u64,
}

#[derive(Debug, Default)]
struct IngestCounters {
    admitted: AtomicU64,
    skipped: AtomicU64,
}

/// Writes batches to a [`RecordStore`] with a per-call timeout and bounded
/// exponential backoff between attempts.
pub struct SinkWriter {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
    backoff: Backoff,
    /// Timed-out attempts that may still land; settled before the next batch.
    stragglers: Vec<JoinHandle<Result<usize, SinkError>>>,
}

impl SinkWriter {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration, backoff: Backoff) -> Self {
        Self { store, timeout, backoff, stragglers: Vec::new() }
    }

    /// Persist one batch. Returns `(rows, retries)` on success.
    pub async fn write(&mut self, records: Arc<Vec<ScoredRecord>>) -> Result<(usize, u32), PipelineError> {
        self.settle_stragglers().await;
        let mut attempt = 0u32;
        loop {
            let store = self.store.clone();
            let batch = records.clone();
            let mut task = tokio::task::spawn_blocking(move || store.upsert(&batch));
            let result = match tokio::time::timeout(self.timeout, &mut task).await {
                Ok(Ok(res)) => res,
                Ok(Err(join)) => Err(SinkError::Unavailable(format!("write task failed: {join}"))),
                Err(_) => {
                    self.stragglers.push(task);
                    Err(SinkError::Timeout(self.timeout))
                }
            };
            match result {
                Ok(rows) => {
                    self.settle_stragglers().await;
                    return Ok((rows, attempt));
                }
                Err(err) if err.is_retryable() && self.backoff.allows(attempt) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %err, "persistence write failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts = attempt + 1, error = %err, "persistence write failed");
                    return Err(PipelineError::Sink { attempts: attempt + 1, source: err });
                }
            }
        }
    }

    /// Wait (bounded) for timed-out writes so they cannot land after a later batch.
    async fn settle_stragglers(&mut self) {
        for handle in self.stragglers.drain(..) {
            if tokio::time::timeout(self.timeout, handle).await.is_err() {
                warn!("a timed-out persistence write is still pending");
            }
        }
    }
}

/// Normalizes and scores records. Holds only immutable state.
pub struct Scorer {
    normalizer: Normalizer,
    classifier: SentimentClassifier,
}

impl Scorer {
    pub fn new(normalizer: Normalizer, classifier: SentimentClassifier) -> Self {
        Self { normalizer, classifier }
    }

    pub fn score(&self, raw: RawRecord) -> ScoredRecord {
        let normalized = self.normalizer.normalize(&raw.text);
        let (label, compound) = self.classifier.classify(&normalized.tokens);
        ScoredRecord {
            record: NormalizedRecord { raw, tokens: normalized.tokens, normalized_text: normalized.text },
            label,
            compound,
        }
    }

    pub fn score_batch(&self, batch: Batch) -> Vec<ScoredRecord> {
        batch.records.into_iter().map(|raw| self.score(raw)).collect()
    }
}

/// Wires ingestion buffer → normalizer → {classifier, trending window} → sink.
pub struct Pipeline {
    config: PipelineConfig,
    scorer: Scorer,
    trends: SharedTrends,
    store: Arc<dyn RecordStore>,
    handle: BufferHandle,
    receiver: BatchReceiver,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn RecordStore>) -> Result<Self, PipelineError> {
        config.validate()?;
        let scorer = Scorer::new(config.normalizer(), config.classifier()?);
        let trends = SharedTrends::new(config.window());
        let (handle, receiver) = ingestion_buffer(config.max_batch_size, config.max_batch_age(), config.buffer_capacity_factor);
        Ok(Self { config, scorer, trends, store, handle, receiver })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Producer handle; `shutdown()` on it starts a graceful stop.
    pub fn handle(&self) -> BufferHandle {
        self.handle.clone()
    }

    pub fn trends(&self) -> SharedTrends {
        self.trends.clone()
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// Run until the source ends, the handle is shut down, or a fatal error.
    /// Every record admitted before shutdown is persisted before returning.
    pub async fn run<S: RecordSource + 'static>(self, source: S) -> Result<PipelineReport, PipelineError> {
        let Pipeline { config, scorer, trends, store, handle, mut receiver } = self;

        let counters = Arc::new(IngestCounters::default());
        let producer = tokio::spawn(ingest(source, handle.clone(), config.source_backoff(), counters.clone()));
        let mut writer = SinkWriter::new(store, config.sink_timeout(), config.sink_backoff());
        let mut report = PipelineReport::default();

        info!(max_batch_size = config.max_batch_size, window_secs = config.window_secs, "pipeline started");
        while let Some(batch) = receiver.next_batch().await {
            report.batches += 1;
            match batch.reason {
                CloseReason::Size => report.size_batches += 1,
                CloseReason::Age => report.age_batches += 1,
                CloseReason::Shutdown => report.shutdown_batches += 1,
            }
            let scored = scorer.score_batch(batch);
            report.records += scored.len() as u64;

            let inserted = trends.insert_many(
                scored.iter().map(|s| (s.id(), s.record.tokens.as_slice())),
                OffsetDateTime::now_utc(),
            );
            debug!(records = scored.len(), inserted, "batch added to trending window");

            match writer.write(Arc::new(scored)).await {
                Ok((rows, retries)) => {
                    report.persisted += rows as u64;
                    report.sink_retries += u64::from(retries);
                    info!(batch = report.batches, rows, "batch persisted");
                }
                Err(err) => {
                    handle.shutdown();
                    producer.abort();
                    return Err(err);
                }
            }
        }

        if !producer.is_finished() {
            producer.abort();
        }
        let ingest_result = match producer.await {
            Ok(result) => result,
            Err(join) if join.is_cancelled() => Ok(()),
            Err(join) => Err(PipelineError::Aborted(join.to_string())),
        };
        report.skipped = counters.skipped.load(Ordering::Relaxed);
        info!(
            batches = report.batches,
            records = report.records,
            admitted = counters.admitted.load(Ordering::Relaxed),
            skipped = report.skipped,
            "pipeline stopped"
        );
        ingest_result.map(|()| report)
    }
}

/// Producer loop: pull, validate, admit. Rate limits back off and retry;
/// anything else fatal closes the buffer so the consumer can drain.
async fn ingest<S: RecordSource>(
    mut source: S,
    handle: BufferHandle,
    backoff: Backoff,
    counters: Arc<IngestCounters>,
) -> Result<(), PipelineError> {
    let mut retries = 0u32;
    loop {
        let pulled = match source.pull().await {
            Ok(pulled) => {
                retries = 0;
                pulled
            }
            Err(err) if err.is_retryable() && backoff.allows(retries) => {
                let delay = match &err {
                    SourceError::RateLimited { retry_after: Some(hint) } => *hint,
                    _ => backoff.delay(retries),
                };
                warn!(attempt = retries + 1, ?delay, error = %err, "ingestion source throttled; backing off");
                retries += 1;
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(err) => {
                error!(error = %err, "ingestion source failed");
                handle.shutdown();
                return Err(PipelineError::Ingestion(err));
            }
        };

        match pulled {
            Pulled::EndOfStream => {
                info!("ingestion source reached end of stream");
                handle.shutdown();
                return Ok(());
            }
            Pulled::Malformed(reason) => {
                warn!(%reason, "skipping malformed record");
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Pulled::Record(incoming) => match incoming.into_raw(OffsetDateTime::now_utc()) {
                Ok(raw) => match handle.accept(raw).await {
                    Ok(()) => {
                        counters.admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(BufferError::Closed) => {
                        debug!("buffer closed; ingestion stopping");
                        return Ok(());
                    }
                    Err(err @ BufferError::Backpressure { .. }) => {
                        // accept() waits for room, so this is not expected
                        warn!(error = %err, "record refused");
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Err(reason) => {
                    warn!(%reason, "skipping malformed record");
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                }
            },
        }
    }
}
