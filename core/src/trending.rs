use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// One document inside the sliding window.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub document_id: String,
    /// Distinct terms of the document with their in-document counts.
    pub term_counts: Vec<(String, u32)>,
    pub inserted_at: OffsetDateTime,
}

/// Aggregates for a single term over the live window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStat {
    /// Number of live documents containing the term.
    pub doc_freq: u32,
    /// Sum of the term's in-document counts over live documents.
    pub term_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTerm {
    pub term: String,
    pub weight: f64,
    pub doc_freq: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub documents: usize,
    pub distinct_terms: usize,
    pub evicted_total: u64,
}

/// Smoothed inverse document frequency.
pub fn idf(doc_freq: u32, num_docs: usize) -> f64 {
    ((num_docs as f64 + 1.0) / (doc_freq as f64 + 1.0)).ln() + 1.0
}

/// `now - window`, or `None` when that falls before the representable range.
fn cutoff(now: OffsetDateTime, window: Duration) -> Option<OffsetDateTime> {
    time::Duration::try_from(window).ok().and_then(|w| now.checked_sub(w))
}

fn rank(a: &TopTerm, b: &TopTerm) -> Ordering {
    b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term))
}

/// Sliding time window of documents with incrementally maintained term
/// statistics. Every mutation adjusts [`TermStat`]s by the delta of the
/// entry being added or removed, so queries never rescan the window.
#[derive(Debug)]
pub struct TrendingTerms {
    window: Duration,
    entries: VecDeque<WindowEntry>,
    live: HashSet<String>,
    terms: HashMap<String, TermStat>,
    /// Latest `now` observed; the window never moves backwards.
    high_water: Option<OffsetDateTime>,
    evicted_total: u64,
}

impl TrendingTerms {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
            live: HashSet::new(),
            terms: HashMap::new(),
            high_water: None,
            evicted_total: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn term_stat(&self, term: &str) -> Option<TermStat> {
        self.terms.get(term).copied()
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            documents: self.entries.len(),
            distinct_terms: self.terms.len(),
            evicted_total: self.evicted_total,
        }
    }

    fn advance(&mut self, now: OffsetDateTime) -> OffsetDateTime {
        let now = match self.high_water {
            Some(hw) if hw > now => hw,
            _ => now,
        };
        self.high_water = Some(now);
        now
    }

    /// Drop every entry older than `now - window`. Returns how many were removed.
    pub fn evict_expired(&mut self, now: OffsetDateTime) -> usize {
        let now = self.advance(now);
        let Some(cutoff) = cutoff(now, self.window) else {
            return 0;
        };
        let mut removed = 0;
        while self.entries.front().is_some_and(|e| e.inserted_at < cutoff) {
            if let Some(entry) = self.entries.pop_front() {
                self.remove_contribution(&entry);
                self.live.remove(&entry.document_id);
                removed += 1;
            }
        }
        if removed > 0 {
            self.evicted_total += removed as u64;
            tracing::debug!(removed, live = self.entries.len(), terms = self.terms.len(), "evicted expired documents");
        }
        removed
    }

    fn remove_contribution(&mut self, entry: &WindowEntry) {
        for (term, count) in &entry.term_counts {
            if let Some(stat) = self.terms.get_mut(term) {
                stat.doc_freq -= 1;
                stat.term_count -= u64::from(*count);
                if stat.doc_freq == 0 {
                    self.terms.remove(term);
                }
            }
        }
    }

    /// Add a document to the window. Returns `false` when the id is already
    /// live or the timestamp is already outside the window.
    pub fn insert<S: AsRef<str>>(&mut self, document_id: &str, tokens: &[S], inserted_at: OffsetDateTime) -> bool {
        self.evict_expired(inserted_at);
        let stale = cutoff(self.high_water.unwrap_or(inserted_at), self.window).is_some_and(|c| inserted_at < c);
        if stale || self.live.contains(document_id) {
            return false;
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_ref()).or_insert(0) += 1;
        }
        let mut term_counts: Vec<(String, u32)> = Vec::with_capacity(counts.len());
        for (term, count) in counts {
            let stat = self.terms.entry(term.to_string()).or_default();
            stat.doc_freq += 1;
            stat.term_count += u64::from(count);
            term_counts.push((term.to_string(), count));
        }

        let entry = WindowEntry { document_id: document_id.to_string(), term_counts, inserted_at };
        // Keep the deque ordered by time so eviction stays a front pop.
        let pos = self.entries.partition_point(|e| e.inserted_at <= inserted_at);
        self.entries.insert(pos, entry);
        self.live.insert(document_id.to_string());
        true
    }

    /// The `k` heaviest terms, weight = Σ tf × idf. Ties break on the term.
    /// Cost is linear in the number of distinct live terms.
    pub fn top_terms(&self, k: usize) -> Vec<TopTerm> {
        if k == 0 || self.terms.is_empty() {
            return Vec::new();
        }
        let n = self.entries.len();
        let mut scored: Vec<TopTerm> = self
            .terms
            .iter()
            .map(|(term, stat)| TopTerm {
                term: term.clone(),
                weight: stat.term_count as f64 * idf(stat.doc_freq, n),
                doc_freq: stat.doc_freq,
            })
            .collect();
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);
        scored
    }
}

/// Handle shared between the pipeline (sole writer) and query callers.
#[derive(Debug, Clone)]
pub struct SharedTrends {
    inner: Arc<RwLock<TrendingTerms>>,
}

impl SharedTrends {
    pub fn new(window: Duration) -> Self {
        Self { inner: Arc::new(RwLock::new(TrendingTerms::new(window))) }
    }

    pub fn insert<S: AsRef<str>>(&self, document_id: &str, tokens: &[S], inserted_at: OffsetDateTime) -> bool {
        self.inner.write().insert(document_id, tokens, inserted_at)
    }

    /// Insert a whole batch under one write lock. Returns how many were added.
    pub fn insert_many<'a, I>(&self, documents: I, inserted_at: OffsetDateTime) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut guard = self.inner.write();
        let mut added = 0;
        for (id, tokens) in documents {
            if guard.insert(id, tokens, inserted_at) {
                added += 1;
            }
        }
        added
    }

    pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
        self.inner.write().evict_expired(now)
    }

    /// Evict against `now`, then rank under a read lock.
    pub fn top_terms_at(&self, k: usize, now: OffsetDateTime) -> Vec<TopTerm> {
        let mut guard = self.inner.write();
        guard.evict_expired(now);
        let guard = RwLockWriteGuard::downgrade(guard);
        guard.top_terms(k)
    }

    pub fn top_terms(&self, k: usize) -> Vec<TopTerm> {
        self.top_terms_at(k, OffsetDateTime::now_utc())
    }

    pub fn stats(&self) -> WindowStats {
        self.inner.read().stats()
    }
}
