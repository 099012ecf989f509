//! Core types for sanDB

use crate::{Result, SanError};
use serde::{Deserialize, Serialize, Serializer};

/// Timestamp in milliseconds since Unix epoch
pub type Timestamp = i64;

/// Record payload as returned by reads.
///
/// Values are stored as the JSON encoding of whatever the client sent. On the
/// way out the bytes are decoded again; anything that is no longer valid JSON
/// is handed back untouched as `Raw`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Successfully decoded JSON value
    Structured(serde_json::Value),
    /// Stored bytes that did not decode
    Raw(Vec<u8>),
}

impl Payload {
    /// Decode stored bytes, falling back to `Raw`
    pub fn from_stored(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Structured(value),
            Err(_) => Payload::Raw(bytes.to_vec()),
        }
    }

    /// Encode for storage
    pub fn to_stored(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Structured(value) => serde_json::to_vec(value)
                .map_err(|e| SanError::invalid(format!("unencodable payload: {}", e))),
            Payload::Raw(bytes) => Ok(bytes.clone()),
        }
    }

    /// Get the structured value if decoding succeeded
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Structured(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Structured(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(value)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Payload::Structured(value) => value.serialize(serializer),
            Payload::Raw(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Payload::Structured)
    }
}

/// A single timestamped record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Timestamp in milliseconds
    pub time: Timestamp,
    /// Opaque payload, `null` when omitted
    #[serde(default)]
    pub data: Payload,
}

impl Record {
    /// Create a new record
    pub fn new(time: Timestamp, data: impl Into<Payload>) -> Self {
        Self {
            time,
            data: data.into(),
        }
    }
}

/// Closed time interval for queries and deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Timestamp,
    /// End timestamp (inclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Create a validated time range: both bounds positive, `start <= end`
    pub fn checked(start: Timestamp, end: Timestamp) -> Result<Self> {
        let range = Self::new(start, end);
        range.validate()?;
        Ok(range)
    }

    /// Reject non-positive bounds and inverted intervals
    pub fn validate(&self) -> Result<()> {
        if self.start <= 0 {
            return Err(SanError::invalid(format!("start must be positive, got {}", self.start)));
        }
        if self.end <= 0 {
            return Err(SanError::invalid(format!("end must be positive, got {}", self.end)));
        }
        if self.start > self.end {
            return Err(SanError::invalid(format!(
                "start ({}) is after end ({})",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Check if a timestamp is within the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Offset/limit applied after the global time sort
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Maximum number of records; `None` is unbounded
    pub limit: Option<usize>,
    /// Leading records to skip
    pub offset: usize,
}

impl Pagination {
    /// Build pagination from raw client values.
    ///
    /// `limit` must be positive and `offset` non-negative when given.
    pub fn from_params(limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let limit = match limit {
            Some(l) if l <= 0 => {
                return Err(SanError::invalid(format!("limit must be positive, got {}", l)))
            }
            Some(l) => Some(usize::try_from(l).map_err(|_| SanError::invalid("limit too large"))?),
            None => None,
        };
        let offset = match offset {
            Some(o) if o < 0 => {
                return Err(SanError::invalid(format!("offset must not be negative, got {}", o)))
            }
            Some(o) => usize::try_from(o).map_err(|_| SanError::invalid("offset too large"))?,
            None => 0,
        };
        Ok(Self { limit, offset })
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(SanError::invalid("limit must be positive, got 0"));
        }
        Ok(())
    }

    /// Apply offset then limit to a sorted sequence
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.offset >= items.len() {
            return Vec::new();
        }
        items.drain(..self.offset);
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        items
    }
}
