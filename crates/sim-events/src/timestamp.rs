//! Simulation Calendar
//!
//! One tick of the simulation is one month. A [`MonthStamp`] counts months
//! since year 0, month 1, and renders as a human-readable date.
//!
//! # Example
//!
//! ```
//! use sim_events::MonthStamp;
//!
//! let stamp = MonthStamp::from_year_month(100, 3);
//! assert_eq!(stamp.year(), 100);
//! assert_eq!(stamp.month(), 3);
//! assert_eq!(stamp.to_string(), "year_100.month_3");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of months in a simulated year.
pub const MONTHS_PER_YEAR: u64 = 12;

/// Absolute simulation time in months.
///
/// Serializes as the bare month count so events stay compact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MonthStamp(pub u64);

impl MonthStamp {
    /// Creates a stamp from a year and a 1-based month.
    ///
    /// Months outside 1..=12 are clamped into range.
    pub fn from_year_month(year: u64, month: u8) -> Self {
        let month = u64::from(month.clamp(1, 12));
        Self(year * MONTHS_PER_YEAR + (month - 1))
    }

    /// Returns the year component.
    pub fn year(self) -> u64 {
        self.0 / MONTHS_PER_YEAR
    }

    /// Returns the 1-based month component.
    pub fn month(self) -> u8 {
        (self.0 % MONTHS_PER_YEAR) as u8 + 1
    }

    /// Returns the stamp one month later.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the stamp `months` later.
    pub fn plus(self, months: u64) -> Self {
        Self(self.0 + months)
    }

    /// Months elapsed since `earlier`, zero if `earlier` lies in the future.
    pub fn since(self, earlier: MonthStamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for MonthStamp {
    fn from(months: u64) -> Self {
        Self(months)
    }
}

impl fmt::Display for MonthStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "year_{}.month_{}", self.year(), self.month())
    }
}

/// Error type for parsing a MonthStamp from its display form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseStampError {
    InvalidFormat(String),
    InvalidYear(String),
    InvalidMonth(String),
}

impl fmt::Display for ParseStampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseStampError::InvalidFormat(s) => {
                write!(f, "invalid stamp format: '{}', expected 'year_N.month_M'", s)
            }
            ParseStampError::InvalidYear(s) => write!(f, "invalid year: '{}'", s),
            ParseStampError::InvalidMonth(s) => write!(f, "invalid month: '{}'", s),
        }
    }
}

impl std::error::Error for ParseStampError {}

impl FromStr for MonthStamp {
    type Err = ParseStampError;

    /// Parses a stamp from a string like "year_100.month_3".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year_part, month_part) = s
            .split_once('.')
            .ok_or_else(|| ParseStampError::InvalidFormat(s.to_string()))?;

        let year = year_part
            .strip_prefix("year_")
            .ok_or_else(|| ParseStampError::InvalidFormat(s.to_string()))?
            .parse::<u64>()
            .map_err(|_| ParseStampError::InvalidYear(year_part.to_string()))?;

        let month = month_part
            .strip_prefix("month_")
            .ok_or_else(|| ParseStampError::InvalidFormat(s.to_string()))?
            .parse::<u8>()
            .map_err(|_| ParseStampError::InvalidMonth(month_part.to_string()))?;

        if !(1..=12).contains(&month) {
            return Err(ParseStampError::InvalidMonth(month_part.to_string()));
        }

        Ok(MonthStamp::from_year_month(year, month))
    }
}
