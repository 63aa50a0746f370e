//! Period budget models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Budget granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Period {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Annual => "annual",
        }
    }

    /// Parse a user-supplied period string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannual" => Some(Self::Semiannual),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which adjacent window to resolve relative to the reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Prev,
    Next,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prev => "prev",
            Self::Next => "next",
        }
    }

    /// Parse a user-supplied direction string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prev" => Some(Self::Prev),
            "next" => Some(Self::Next),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted overview for one (user, period). Overwritten on every
/// calculation, never appended.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub user_id: String,
    pub period: String,
    pub record_date: NaiveDate,
    pub total_amount: f64,
    pub remaining_amount: f64,
    pub spent_amount: f64,
    pub upcoming_amount: f64,
    pub from_previous: f64,
    pub expense_percent: f64,
    pub total_income: f64,
    pub daily_rate: f64,
    pub updated_utc: DateTime<Utc>,
}

/// Computed budget position for a resolved window.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetOverview {
    pub user_id: String,
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub from_previous: f64,
    pub total_income: f64,
    pub spent_amount: f64,
    pub upcoming_bills: f64,
    pub combined_expense: f64,
    pub total_amount: f64,
    pub remaining_amount: f64,
    pub expense_percent: f64,
    pub daily_rate: f64,
}
