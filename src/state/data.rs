/// Shared data structures for the farm domain
///
/// These structs represent the data model that flows between
/// the document store and the screens.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use crate::backend::{Document, Fields};

/// Represents a single farm owned by one user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FarmRecord {
    /// Document id (creation timestamp in milliseconds). Not part of the body.
    #[serde(skip)]
    pub id: String,
    /// Owner's session uid
    pub uid: String,
    pub display_name: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free text, e.g. "8-17"
    #[serde(default)]
    pub open_hours: Option<String>,
    /// Durable image URL, empty when the farm has no image
    #[serde(default)]
    pub image: String,
}

impl FarmRecord {
    /// Document body for this record
    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "farm record serialized to {} instead of an object",
                other
            ))),
        }
    }

    /// Rebuild a record from a stored document
    pub fn from_document(document: Document) -> Result<Self, serde_json::Error> {
        let mut record: FarmRecord = serde_json::from_value(Value::Object(document.fields))?;
        record.id = document.id;
        Ok(record)
    }

    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}

/// Millisecond clock that never hands out the same value twice.
///
/// Two calls in the same millisecond get consecutive values, so
/// timestamp-derived ids and blob keys stay unique within the process.
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(AtomicOrdering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                next,
                AtomicOrdering::SeqCst,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared by farm ids and image keys
static CLOCK: MonotonicClock = MonotonicClock::new();

/// Next creation timestamp, used for record ids and blob key suffixes
pub fn next_timestamp() -> i64 {
    CLOCK.next_millis()
}

/// Order records by creation: numeric ids ascending, anything else after them
pub fn compare_creation(a: &FarmRecord, b: &FarmRecord) -> Ordering {
    match (a.id.parse::<i64>(), b.id.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.id.cmp(&b.id),
    }
}

pub fn sort_by_creation(records: &mut [FarmRecord]) {
    records.sort_by(compare_creation);
}
