//! Month key ("YYYY-MM") for the monthly balance tables.

use cashbook_core::error::AppError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Calendar month identifier.
///
/// Renders zero-padded ("2024-03") so that lexical order on the stored TEXT
/// column equals chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build from components. Rejects months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::DateFormatError(anyhow::anyhow!(
                "month {} out of range 1..=12",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// The month a date falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// This month shifted by `months` (negative shifts go backwards).
    pub fn plus_months(self, months: i32) -> Self {
        let zero_based = (self.year as i64) * 12 + (self.month as i64 - 1) + months as i64;
        Self {
            year: zero_based.div_euclid(12) as i32,
            month: (zero_based.rem_euclid(12) + 1) as u32,
        }
    }

    /// First calendar day of this month.
    pub fn first_day(self) -> NaiveDate {
        // Month is validated on construction, day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of this month.
    pub fn last_day(self) -> NaiveDate {
        self.plus_months(1)
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = AppError;

    /// Parse the canonical "YYYY-MM" form. Unpadded input is rejected so a
    /// malformed key can never land between two well-formed ones in the
    /// lexical ordering.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or_else(|| {
            AppError::DateFormatError(anyhow::anyhow!("expected YYYY-MM, got '{}'", s))
        })?;

        if year.len() != 4 || month.len() != 2 {
            return Err(AppError::DateFormatError(anyhow::anyhow!(
                "expected YYYY-MM, got '{}'",
                s
            )));
        }

        let year: i32 = year.parse().map_err(|_| {
            AppError::DateFormatError(anyhow::anyhow!("invalid year in '{}'", s))
        })?;
        let month: u32 = month.parse().map_err(|_| {
            AppError::DateFormatError(anyhow::anyhow!("invalid month in '{}'", s))
        })?;

        Self::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_zero_padded() {
        let key = MonthKey::new(2024, 3).unwrap();
        assert_eq!(key.to_string(), "2024-03");
    }

    #[test]
    fn parses_canonical_form() {
        let key: MonthKey = "2024-11".parse().unwrap();
        assert_eq!(key.year(), 2024);
        assert_eq!(key.month(), 11);
    }

    #[test]
    fn rejects_unpadded_month() {
        assert!("2024-3".parse::<MonthKey>().is_err());
        assert!("24-03".parse::<MonthKey>().is_err());
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("202403".parse::<MonthKey>().is_err());
    }

    #[test]
    fn plus_months_wraps_year() {
        let key = MonthKey::new(2024, 11).unwrap();
        assert_eq!(key.plus_months(0).to_string(), "2024-11");
        assert_eq!(key.plus_months(1).to_string(), "2024-12");
        assert_eq!(key.plus_months(2).to_string(), "2025-01");
        assert_eq!(key.plus_months(14).to_string(), "2026-01");
    }

    #[test]
    fn plus_months_goes_backwards() {
        let key = MonthKey::new(2024, 2).unwrap();
        assert_eq!(key.plus_months(-1).to_string(), "2024-01");
        assert_eq!(key.plus_months(-2).to_string(), "2023-12");
        assert_eq!(key.plus_months(-14).to_string(), "2022-12");
    }

    #[test]
    fn from_date_takes_calendar_month() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(MonthKey::from_date(date).to_string(), "2024-01");
    }

    #[test]
    fn month_bounds() {
        let feb_leap = MonthKey::new(2024, 2).unwrap();
        assert_eq!(
            feb_leap.first_day(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
        assert_eq!(
            feb_leap.last_day(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );

        let dec = MonthKey::new(2024, 12).unwrap();
        assert_eq!(
            dec.last_day(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
    }

    #[test]
    fn ordering_matches_chronology() {
        let a: MonthKey = "2023-12".parse().unwrap();
        let b: MonthKey = "2024-01".parse().unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
