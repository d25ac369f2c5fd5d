use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::MalformedRecord;

pub const MAX_ID_LEN: usize = 64;

/// A record as delivered by the feed. Every field is optional here; conversion
/// into [`RawRecord`] decides what is malformed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "user")]
    pub author: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub timestamp: OffsetDateTime,
    pub author: Option<String>,
    pub location: Option<String>,
    pub text: String,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: OffsetDateTime::now_utc(),
            author: None,
            location: None,
            text: text.into(),
        }
    }
}

impl IncomingRecord {
    /// Validate and convert. `received_at` stands in for a missing timestamp.
    pub fn into_raw(self, received_at: OffsetDateTime) -> Result<RawRecord, MalformedRecord> {
        let id = match self.id {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Null) | None => return Err(MalformedRecord::MissingField("id")),
            Some(other) => {
                return Err(MalformedRecord::InvalidId { id: other.to_string(), reason: "id must be a string or number" })
            }
        };
        validate_id(&id).map_err(|reason| MalformedRecord::InvalidId { id: id.clone(), reason })?;
        let text = self.text.ok_or(MalformedRecord::MissingField("text"))?;
        let timestamp = match self.timestamp.as_deref().map(str::trim) {
            None | Some("") => received_at,
            Some(ts) => OffsetDateTime::parse(ts, &Rfc3339).map_err(|_| MalformedRecord::InvalidTimestamp(ts.to_string()))?,
        };
        Ok(RawRecord {
            id,
            timestamp,
            author: self.author.filter(|s| !s.is_empty()),
            location: self.location.filter(|s| !s.is_empty()),
            text,
        })
    }
}

/// Shape check shared by ingestion and the persistence sink.
pub fn validate_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("id is empty");
    }
    if id.len() > MAX_ID_LEN {
        return Err("id is longer than 64 bytes");
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("id contains whitespace or control characters");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub raw: RawRecord,
    pub tokens: Vec<String>,
    pub normalized_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: NormalizedRecord,
    pub label: SentimentLabel,
    pub compound: f64,
}

impl ScoredRecord {
    pub fn id(&self) -> &str {
        &self.record.raw.id
    }
}

/// The persisted row for one record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub created_at: String,
    pub author: Option<String>,
    pub location: Option<String>,
    pub text: String,
    pub normalized_text: String,
    pub sentiment: SentimentLabel,
    pub compound: f64,
}

impl From<&ScoredRecord> for StoredRecord {
    fn from(scored: &ScoredRecord) -> Self {
        let raw = &scored.record.raw;
        Self {
            id: raw.id.clone(),
            created_at: raw.timestamp.format(&Rfc3339).unwrap_or_default(),
            author: raw.author.clone(),
            location: raw.location.clone(),
            text: raw.text.clone(),
            normalized_text: scored.record.normalized_text.clone(),
            sentiment: scored.label,
            compound: scored.compound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn incoming(json: &str) -> IncomingRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn numeric_ids_and_aliases_are_accepted() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let rec = incoming(r#"{"id": 1234, "created_at": "2023-06-01T10:00:00Z", "user": "sam", "text": "hi"}"#)
            .into_raw(now)
            .unwrap();
        assert_eq!(rec.id, "1234");
        assert_eq!(rec.author.as_deref(), Some("sam"));
        assert_eq!(rec.timestamp, datetime!(2023-06-01 10:00 UTC));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(incoming(r#"{"text": "x"}"#).into_raw(now), Err(MalformedRecord::MissingField("id")));
        assert_eq!(incoming(r#"{"id": "a"}"#).into_raw(now), Err(MalformedRecord::MissingField("text")));
        assert!(matches!(
            incoming(r#"{"id": "a b", "text": "x"}"#).into_raw(now),
            Err(MalformedRecord::InvalidId { .. })
        ));
        assert!(matches!(
            incoming(r#"{"id": "a", "text": "x", "timestamp": "yesterday"}"#).into_raw(now),
            Err(MalformedRecord::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn missing_timestamp_uses_receive_time() {
        let now = datetime!(2024-03-03 12:00 UTC);
        let rec = incoming(r#"{"id": "x1", "text": ""}"#).into_raw(now).unwrap();
        assert_eq!(rec.timestamp, now);
        assert_eq!(rec.text, "");
    }
}
