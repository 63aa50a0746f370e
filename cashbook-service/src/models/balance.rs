//! Monthly cash/bank balance row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Derived balance state of one (user, month).
///
/// The six accumulators are bumped by event recorders; the derived fields
/// are owned by the recalculation engine and obey
/// `cash_amount = previous_cash_amount + income_cash - expense_cash - bill_cash`
/// (symmetric for bank) and `total_balance = cash_amount + bank_amount`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MonthlyBalance {
    pub user_id: String,
    pub year_month: String,
    pub income_cash: f64,
    pub income_bank: f64,
    pub expense_cash: f64,
    pub expense_bank: f64,
    pub bill_cash: f64,
    pub bill_bank: f64,
    pub cash_amount: f64,
    pub bank_amount: f64,
    pub previous_cash_amount: f64,
    pub previous_bank_amount: f64,
    pub total_previous_balance: f64,
    pub total_balance: f64,
}
