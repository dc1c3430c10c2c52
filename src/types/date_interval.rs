use crate::types::error::DateError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    /// Creates an interval, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateError> {
        if start > end {
            return Err(DateError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses two `YYYY-MM-DD` strings into an interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use envfuse::DateInterval;
    ///
    /// let january = DateInterval::parse("2020-01-01", "2020-01-31").unwrap();
    /// assert_eq!(january.days(), 31);
    /// assert!(DateInterval::parse("2020/01/01", "2020-01-31").is_err());
    /// ```
    pub fn parse(start: &str, end: &str) -> Result<Self, DateError> {
        Self::new(parse_iso_date(start)?, parse_iso_date(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Parses a strict ISO calendar date (`YYYY-MM-DD`, no time of day).
pub fn parse_iso_date(value: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE_FORMAT)
        .map_err(|e| DateError::InvalidDateFormat(value.to_string(), e))
}
