//! Bill and bill payment models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::PaymentMethod;

/// Recurring obligation amortized over one or more months.
///
/// `paid` is true only once every payment row of the bill is paid.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub payment_day: i64,
    pub duration_months: i64,
    pub payment_method: String,
    pub category: String,
    pub icon: String,
    pub regularity: String,
    pub paid: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Bill {
    /// Get parsed payment method.
    pub fn parsed_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::parse(&self.payment_method)
    }

    /// Overdue state relative to `as_of`. A paid bill is never overdue; an
    /// unpaid one is overdue once `as_of` is strictly past the due date.
    pub fn overdue_status(&self, as_of: NaiveDate) -> (bool, i64) {
        if self.paid || as_of <= self.due_date {
            return (false, 0);
        }
        (true, (as_of - self.due_date).num_days())
    }
}

/// One month's share of a bill. Exactly `duration_months` rows exist per
/// bill, one per affected month.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BillPayment {
    pub id: i64,
    pub bill_id: i64,
    pub user_id: String,
    pub year_month: String,
    pub paid: bool,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a bill. Due date and method arrive as raw strings and
/// are validated before any storage work happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    pub payment_day: i64,
    pub duration_months: i64,
    pub payment_method: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub regularity: String,
}

/// Partial update for a bill. `None` keeps the stored value. The schedule
/// shape (due date, duration, payment day) is fixed at creation; reshaping
/// a bill is delete + re-create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBill {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub payment_method: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub regularity: Option<String>,
}

/// Bill listing entry with overdue state derived at read time.
#[derive(Debug, Clone, Serialize)]
pub struct BillWithStatus {
    #[serde(flatten)]
    pub bill: Bill,
    pub overdue: bool,
    pub overdue_days: i64,
}

impl BillWithStatus {
    pub fn derive(bill: Bill, as_of: NaiveDate) -> Self {
        let (overdue, overdue_days) = bill.overdue_status(as_of);
        Self {
            bill,
            overdue,
            overdue_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(paid: bool, due: NaiveDate) -> Bill {
        Bill {
            id: 1,
            user_id: "u1".to_string(),
            name: "rent".to_string(),
            amount: 500.0,
            due_date: due,
            payment_day: 1,
            duration_months: 3,
            payment_method: "bank".to_string(),
            category: String::new(),
            icon: String::new(),
            regularity: "monthly".to_string(),
            paid,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn paid_bill_is_never_overdue() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(bill(true, due).overdue_status(as_of), (false, 0));
    }

    #[test]
    fn due_today_is_not_overdue() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(bill(false, due).overdue_status(due), (false, 0));
    }

    #[test]
    fn due_yesterday_is_one_day_overdue() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        assert_eq!(bill(false, due).overdue_status(as_of), (true, 1));
    }
}
