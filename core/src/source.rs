use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use walkdir::WalkDir;

use crate::error::{MalformedRecord, SourceError};
use crate::record::IncomingRecord;

/// One step of an ingestion feed.
#[derive(Debug)]
pub enum Pulled {
    Record(IncomingRecord),
    /// The feed delivered something that is not a record at all.
    Malformed(MalformedRecord),
    EndOfStream,
}

/// A feed of raw records. Rate limiting must surface as
/// [`SourceError::RateLimited`] so the caller can back off and retry.
pub trait RecordSource: Send {
    fn pull(&mut self) -> impl Future<Output = Result<Pulled, SourceError>> + Send;
}

/// Scripted in-memory feed.
#[derive(Debug, Default)]
pub struct VecSource {
    items: VecDeque<Result<Pulled, SourceError>>,
}

impl VecSource {
    pub fn new<I: IntoIterator<Item = IncomingRecord>>(records: I) -> Self {
        Self { items: records.into_iter().map(|r| Ok(Pulled::Record(r))).collect() }
    }

    pub fn scripted(items: Vec<Result<Pulled, SourceError>>) -> Self {
        Self { items: items.into() }
    }
}

impl RecordSource for VecSource {
    async fn pull(&mut self) -> Result<Pulled, SourceError> {
        self.items.pop_front().unwrap_or(Ok(Pulled::EndOfStream))
    }
}

type LineReader = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

/// Replays `.jsonl` / `.json` files as a feed. A directory is walked
/// recursively in path order.
pub struct JsonlSource {
    files: VecDeque<PathBuf>,
    current: Option<LineReader>,
    pending: VecDeque<serde_json::Value>,
}

impl JsonlSource {
    pub fn open<P: AsRef<Path>>(input: P) -> Result<Self, SourceError> {
        let input = input.as_ref();
        let mut files = Vec::new();
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                    files.push(p.to_path_buf());
                }
            }
        } else if input.is_file() {
            files.push(input.to_path_buf());
        } else {
            return Err(SourceError::Closed(format!("input {} does not exist", input.display())));
        }
        tracing::info!(files = files.len(), input = %input.display(), "opened record files");
        Ok(Self { files: files.into(), current: None, pending: VecDeque::new() })
    }

    /// One JSON record per line from any async reader, e.g. stdin.
    pub fn from_reader<R: AsyncBufRead + Send + Unpin + 'static>(reader: R) -> Self {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self { files: VecDeque::new(), current: Some(reader.lines()), pending: VecDeque::new() }
    }

    async fn next_file(&mut self) -> Result<bool, SourceError> {
        let Some(path) = self.files.pop_front() else {
            return Ok(false);
        };
        if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(BufReader::new(File::open(&path).await?));
            self.current = Some(reader.lines());
        } else {
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice(&bytes) {
                Ok(serde_json::Value::Array(items)) => self.pending.extend(items),
                Ok(value) => self.pending.push_back(value),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unparseable json file"),
            }
        }
        Ok(true)
    }

    fn decode(value: serde_json::Value) -> Pulled {
        match serde_json::from_value::<IncomingRecord>(value) {
            Ok(rec) => Pulled::Record(rec),
            Err(err) => Pulled::Malformed(MalformedRecord::Unparseable(err.to_string())),
        }
    }
}

impl RecordSource for JsonlSource {
    async fn pull(&mut self) -> Result<Pulled, SourceError> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Ok(Self::decode(value));
            }
            if let Some(lines) = self.current.as_mut() {
                match lines.next_line().await? {
                    Some(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        return Ok(match serde_json::from_str::<IncomingRecord>(&line) {
                            Ok(rec) => Pulled::Record(rec),
                            Err(err) => Pulled::Malformed(MalformedRecord::Unparseable(err.to_string())),
                        });
                    }
                    None => self.current = None,
                }
                continue;
            }
            if !self.next_file().await? {
                return Ok(Pulled::EndOfStream);
            }
        }
    }
}

/// Case-insensitive keyword / hashtag match on word boundaries. A plain
/// keyword also matches its hashtag or mention form; `#ai` only matches the
/// hashtag. Multi-word keywords match consecutive words. No keywords
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<Vec<String>>,
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '#' | '@' | '_')))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn word_matches(keyword: &str, word: &str) -> bool {
    keyword == word || (!keyword.starts_with(['#', '@']) && word.strip_prefix(['#', '@']) == Some(keyword))
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| words(k.as_ref()).collect::<Vec<_>>())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text: Vec<String> = words(text).collect();
        self.keywords.iter().any(|keyword| {
            text.windows(keyword.len())
                .any(|window| keyword.iter().zip(window).all(|(k, w)| word_matches(k, w)))
        })
    }
}

/// Passes on only records whose text matches the filter.
pub struct FilteredSource<S> {
    inner: S,
    filter: KeywordFilter,
}

impl<S: RecordSource> FilteredSource<S> {
    pub fn new(inner: S, filter: KeywordFilter) -> Self {
        Self { inner, filter }
    }
}

impl<S: RecordSource> RecordSource for FilteredSource<S> {
    async fn pull(&mut self) -> Result<Pulled, SourceError> {
        loop {
            match self.inner.pull().await? {
                Pulled::Record(rec) if !self.filter.matches(rec.text.as_deref().unwrap_or_default()) => continue,
                other => return Ok(other),
            }
        }
    }
}
