use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::BookingError;

/// Wire format, e.g. `2025/03/07 & 3:04 PM`.
pub const WIRE_FORMAT: &str = "%Y/%m/%d & %-I:%M %p";
const PARSE_FORMAT: &str = "%Y/%m/%d & %I:%M %p";
pub const DAY_FORMAT: &str = "%Y/%m/%d";

/// A clinic-local slot time.
///
/// Equality, ordering keys for uniqueness and hashing use the exact string the
/// client sent; `at` is only used for arithmetic (horizon, reminder window,
/// range filters, chronological sort).
#[derive(Debug, Clone)]
pub struct SlotDateTime {
    raw: String,
    at: NaiveDateTime,
}

impl SlotDateTime {
    pub fn parse(input: &str) -> Result<Self, BookingError> {
        let raw = input.trim();
        let (date, time) = raw.split_once(" & ").ok_or_else(|| {
            BookingError::validation(format!(
                "date_time must look like YYYY/MM/DD & H:MM AM|PM, got {raw:?}"
            ))
        })?;
        if date.len() != 10 || time.is_empty() {
            return Err(BookingError::validation(format!(
                "date_time must look like YYYY/MM/DD & H:MM AM|PM, got {raw:?}"
            )));
        }
        let at = NaiveDateTime::parse_from_str(raw, PARSE_FORMAT)
            .map_err(|e| BookingError::validation(format!("invalid date_time {raw:?}: {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            at,
        })
    }

    /// Canonical rendering of an instant (no leading zero on the hour).
    pub fn from_naive(at: NaiveDateTime) -> Self {
        Self {
            raw: at.format(WIRE_FORMAT).to_string(),
            at,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn at(&self) -> NaiveDateTime {
        self.at
    }

    pub fn day(&self) -> NaiveDate {
        self.at.date()
    }

    pub fn is_after(&self, now: NaiveDateTime) -> bool {
        self.at > now
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

impl PartialEq for SlotDateTime {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for SlotDateTime {}

impl std::hash::Hash for SlotDateTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for SlotDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SlotDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SlotDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SlotDateTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

pub fn parse_day(input: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
        .map_err(|_| BookingError::validation(format!("invalid date {input:?}, use YYYY/MM/DD")))
}

/// Inclusive day range; `None` on either end means the current month.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), BookingError> {
    match (start.filter(|s| !s.trim().is_empty()), end.filter(|s| !s.trim().is_empty())) {
        (Some(s), Some(e)) => {
            let s = parse_day(s)?;
            let e = parse_day(e)?;
            if s > e {
                return Err(BookingError::validation("start date must be before end date"));
            }
            Ok((s, e))
        }
        _ => Ok(current_month(today)),
    }
}

pub fn current_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    use chrono::Datelike;
    let first = today.with_day(1).unwrap_or(today);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_first
        .and_then(|d| d.pred_opt())
        .unwrap_or(first);
    (first, last)
}

/// Clinic-local wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetClock {
    offset: FixedOffset,
}

impl FixedOffsetClock {
    pub fn new(offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or(Utc.fix());
        Self { offset }
    }
}

impl Clock for FixedOffsetClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now
            .lock()
            .map(|g| *g)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
