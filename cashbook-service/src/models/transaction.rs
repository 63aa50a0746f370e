//! Income and expense event models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How money moved (physical cash or a bank account).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Bank,
}

impl PaymentMethod {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Bank => "bank",
        }
    }

    /// Parse a stored or user-supplied method string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "bank" => Some(Self::Bank),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded income event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Income {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub payment_method: String,
    pub category: String,
    pub description: String,
    pub created_utc: DateTime<Utc>,
}

impl Income {
    /// Get parsed payment method.
    pub fn parsed_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::parse(&self.payment_method)
    }
}

/// Recorded expense event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub payment_method: String,
    pub category: String,
    pub description: String,
    pub created_utc: DateTime<Utc>,
}

impl Expense {
    /// Get parsed payment method.
    pub fn parsed_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::parse(&self.payment_method)
    }
}

/// Input for recording an income. Date and method arrive as raw strings and
/// are validated before any storage work happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncome {
    pub user_id: String,
    pub amount: f64,
    pub date: String,
    pub payment_method: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// Input for recording an expense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub user_id: String,
    pub amount: f64,
    pub date: String,
    pub payment_method: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for a recorded income. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIncome {
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub payment_method: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Partial update for a recorded expense. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExpense {
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub payment_method: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}
