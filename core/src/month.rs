//! Reference months — the calendar-month time axis of the pipeline.
//!
//! A [`ReferenceMonth`] is a calendar-month bucket (the first day of the
//! month). The classifier receives a fixed, strictly ascending list of them;
//! everything temporal in the pipeline is keyed on this type.

use crate::error::{PipelineError, PipelineResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar-month bucket, normalized to the first day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceMonth(NaiveDate);

impl ReferenceMonth {
    /// Build from a year and a 1-based month number.
    pub fn from_ym(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Truncate a timestamp to its calendar month.
    pub fn truncate(ts: NaiveDateTime) -> Self {
        // with_day(1) cannot fail on a valid date.
        Self(ts.date().with_day(1).unwrap_or_else(|| ts.date()))
    }

    /// Parse `YYYY-MM` or `YYYY-MM-DD` (the day is discarded).
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let full = if s.len() == 7 {
            format!("{s}-01")
        } else {
            s.to_string()
        };
        NaiveDate::parse_from_str(&full, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.with_day(1))
            .map(Self)
            .ok_or_else(|| PipelineError::InvalidMonth {
                value: s.to_string(),
            })
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based month number.
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// The first day of the month, midnight-anchored.
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for ReferenceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Fractional months between a timestamp and a reference month, using the
/// source system's 31-day-month convention: whole calendar months plus
/// `(day - 1 + time_of_day) / 31`. Negative when the timestamp precedes the
/// month.
pub fn months_between(ts: NaiveDateTime, month: ReferenceMonth) -> f64 {
    let whole = (ts.year() - month.year()) * 12 + ts.month() as i32 - month.month() as i32;
    let day_frac = (ts.day() as f64 - 1.0) + ts.num_seconds_from_midnight() as f64 / 86_400.0;
    whole as f64 + day_frac / 31.0
}

/// Validate the externally supplied month list: non-empty and strictly
/// increasing. Classification must not start otherwise.
pub fn validate_months(months: &[ReferenceMonth]) -> PipelineResult<()> {
    if months.is_empty() {
        return Err(PipelineError::EmptyReferenceMonths);
    }
    for pair in months.windows(2) {
        if pair[1] <= pair[0] {
            return Err(PipelineError::NonMonotonicMonths {
                prev: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}
