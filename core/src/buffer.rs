use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::error::BufferError;
use crate::record::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Reached `max_batch_size`.
    Size,
    /// Reached `max_batch_age` since its first record.
    Age,
    /// Flushed by shutdown or because every producer went away.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub records: Vec<RawRecord>,
    pub created_at: OffsetDateTime,
    pub reason: CloseReason,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record refused by [`BufferHandle::try_accept`], handed back to the caller.
#[derive(Debug)]
pub struct Rejected {
    pub record: RawRecord,
    pub error: BufferError,
}

#[derive(Debug)]
struct Shared {
    closed: AtomicBool,
    shutdown: Notify,
    capacity: usize,
}

/// Producer side. Cheap to clone; every clone feeds the same buffer.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    tx: mpsc::Sender<RawRecord>,
    shared: Arc<Shared>,
}

/// Consumer side. Owns batch assembly; there is exactly one.
#[derive(Debug)]
pub struct BatchReceiver {
    rx: mpsc::Receiver<RawRecord>,
    shared: Arc<Shared>,
    max_batch_size: usize,
    max_batch_age: Duration,
    draining: bool,
}

/// Build a buffer holding at most `max_batch_size * capacity_factor` pending records.
pub fn ingestion_buffer(max_batch_size: usize, max_batch_age: Duration, capacity_factor: usize) -> (BufferHandle, BatchReceiver) {
    let max_batch_size = max_batch_size.max(1);
    let capacity = max_batch_size.saturating_mul(capacity_factor.max(1));
    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared { closed: AtomicBool::new(false), shutdown: Notify::new(), capacity });
    (
        BufferHandle { tx, shared: shared.clone() },
        BatchReceiver { rx, shared, max_batch_size, max_batch_age, draining: false },
    )
}

impl BufferHandle {
    /// Enqueue a record, waiting for room when the buffer is full.
    pub async fn accept(&self, record: RawRecord) -> Result<(), BufferError> {
        if self.is_closed() {
            return Err(BufferError::Closed);
        }
        self.tx.send(record).await.map_err(|_| BufferError::Closed)
    }

    /// Enqueue without waiting; a full buffer yields `Backpressure`.
    pub fn try_accept(&self, record: RawRecord) -> Result<(), Rejected> {
        if self.is_closed() {
            return Err(Rejected { record, error: BufferError::Closed });
        }
        self.tx.try_send(record).map_err(|err| match err {
            TrySendError::Full(record) => Rejected { record, error: BufferError::Backpressure { capacity: self.shared.capacity } },
            TrySendError::Closed(record) => Rejected { record, error: BufferError::Closed },
        })
    }

    /// Refuse further records and let the consumer flush what is pending.
    pub fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("ingestion buffer shutting down");
            self.shared.shutdown.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl BatchReceiver {
    /// Wait for the next closed batch. Returns `None` once the buffer is shut
    /// down (or every producer is gone) and fully drained.
    pub async fn next_batch(&mut self) -> Option<Batch> {
        if !self.draining && self.shared.closed.load(Ordering::Acquire) {
            self.begin_drain();
        }
        if self.draining {
            return self.drain_batch().await;
        }

        let first = tokio::select! {
            biased;
            rec = self.rx.recv() => rec,
            _ = self.shared.shutdown.notified() => {
                self.begin_drain();
                return self.drain_batch().await;
            }
        };
        let first = first?;
        let created_at = OffsetDateTime::now_utc();
        let deadline = Instant::now() + self.max_batch_age;
        let mut records = Vec::with_capacity(self.max_batch_size.min(1024));
        records.push(first);

        let reason = loop {
            if records.len() >= self.max_batch_size {
                break CloseReason::Size;
            }
            tokio::select! {
                biased;
                rec = self.rx.recv() => match rec {
                    Some(rec) => records.push(rec),
                    None => break CloseReason::Shutdown,
                },
                _ = sleep_until(deadline) => break CloseReason::Age,
                _ = self.shared.shutdown.notified() => {
                    self.begin_drain();
                    while records.len() < self.max_batch_size {
                        match self.rx.recv().await {
                            Some(rec) => records.push(rec),
                            None => break,
                        }
                    }
                    break if records.len() >= self.max_batch_size { CloseReason::Size } else { CloseReason::Shutdown };
                }
            }
        };

        tracing::debug!(records = records.len(), reason = ?reason, "batch closed");
        Some(Batch { records, created_at, reason })
    }

    fn begin_drain(&mut self) {
        self.draining = true;
        self.rx.close();
    }

    async fn drain_batch(&mut self) -> Option<Batch> {
        let mut records = Vec::new();
        while records.len() < self.max_batch_size {
            match self.rx.recv().await {
                Some(rec) => records.push(rec),
                None => break,
            }
        }
        if records.is_empty() {
            return None;
        }
        let reason = if records.len() >= self.max_batch_size { CloseReason::Size } else { CloseReason::Shutdown };
        tracing::debug!(records = records.len(), reason = ?reason, "batch flushed on shutdown");
        Some(Batch { records, created_at: OffsetDateTime::now_utc(), reason })
    }
}
