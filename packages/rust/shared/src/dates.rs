//! Publication date parsing and partitioning.
//!
//! Documents are bucketed by publication date truncated to a configured
//! [`Granularity`]. Both the landing zone layout and processing range scans are
//! expressed in terms of these buckets.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DocketError, Result};

/// Input formats accepted for publication dates when none are configured.
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m-%d-%Y"];

/// Size of a partition bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// First day of the bucket containing `date`.
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Month => date.with_day(1).unwrap_or(date),
            Self::Year => date.with_ordinal(1).unwrap_or(date),
        }
    }

    /// Human-readable bucket label, also used as the storage directory.
    pub fn label(self, date: NaiveDate) -> String {
        match self {
            Self::Day => date.format("%Y-%m-%d").to_string(),
            Self::Month => date.format("%Y-%m").to_string(),
            Self::Year => date.format("%Y").to_string(),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        })
    }
}

impl std::str::FromStr for Granularity {
    type Err = DocketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(DocketError::config(format!(
                "unknown partition granularity '{other}' (expected day, month or year)"
            ))),
        }
    }
}

/// Parse a publication date using the first matching format.
pub fn parse_published_date<S: AsRef<str>>(raw: &str, formats: &[S]) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DocketError::InvalidMetadata("published date is empty".into()));
    }

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt.as_ref()).ok())
        .ok_or_else(|| {
            DocketError::InvalidMetadata(format!("published date '{trimmed}' not recognised"))
        })
}

/// Parse a run bound given on the command line or API (`YYYY-MM-DD` only).
pub fn parse_run_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| DocketError::validation(format!("invalid date '{raw}': {e}")))
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DocketError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_run_date(start)?, parse_run_date(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Widen both bounds to whole partitions: a range touching a bucket
    /// covers all of it.
    pub fn to_partitions(self, granularity: Granularity) -> Self {
        Self {
            start: granularity.truncate(self.start),
            end: granularity.truncate(self.end),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn parses_each_default_format() {
        assert_eq!(parse_published_date("2025-02-10", DEFAULT_DATE_FORMATS).unwrap(), d(2025, 2, 10));
        assert_eq!(parse_published_date("10/02/2025", DEFAULT_DATE_FORMATS).unwrap(), d(2025, 2, 10));
        assert_eq!(parse_published_date("02-10-2025", DEFAULT_DATE_FORMATS).unwrap(), d(2025, 2, 10));
    }

    #[test]
    fn rejects_garbage_and_empty_dates() {
        let err = parse_published_date("not-a-date", DEFAULT_DATE_FORMATS).unwrap_err();
        assert!(matches!(err, DocketError::InvalidMetadata(_)));
        assert!(parse_published_date("   ", DEFAULT_DATE_FORMATS).is_err());
        assert!(parse_published_date("2025-02-30", DEFAULT_DATE_FORMATS).is_err());
    }

    #[test]
    fn truncation_and_labels() {
        let date = d(2025, 2, 10);
        assert_eq!(Granularity::Month.truncate(date), d(2025, 2, 1));
        assert_eq!(Granularity::Year.truncate(date), d(2025, 1, 1));
        assert_eq!(Granularity::Day.truncate(date), date);
        assert_eq!(Granularity::Month.label(date), "2025-02");
        assert_eq!(Granularity::Year.label(date), "2025");
    }

    #[test]
    fn range_validation_and_partition_widening() {
        assert!(DateRange::parse("2025-03-01", "2025-01-01").is_err());
        assert!(DateRange::parse("2025-01-01", "yesterday").is_err());

        let range = DateRange::parse("2025-01-15", "2025-03-01").unwrap();
        assert!(range.contains(d(2025, 2, 10)));
        assert!(!range.contains(d(2025, 1, 2)));

        let widened = range.to_partitions(Granularity::Month);
        assert_eq!(widened.start, d(2025, 1, 1));
        assert_eq!(widened.end, d(2025, 3, 1));
    }

    #[test]
    fn granularity_from_config_string() {
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("week".parse::<Granularity>().is_err());
    }
}
