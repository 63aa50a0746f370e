//! Cascading recalculation of monthly cash/bank balances.
//!
//! Event recorders bump the per-month accumulators and then run this engine
//! to rebuild every derived field from the first affected month forward. The
//! engine composes inside the caller's transaction so a reader either sees
//! the ledger before the event or after the full recomputation, never in
//! between.

use cashbook_core::error::AppError;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::models::{MonthKey, MonthlyBalance};
use crate::services::metrics::{observe_error, CASCADE_MONTHS};

/// Derived fields for one month, given the closing balance carried in from
/// the preceding month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedBalances {
    pub cash_amount: f64,
    pub bank_amount: f64,
    pub previous_cash_amount: f64,
    pub previous_bank_amount: f64,
    pub total_previous_balance: f64,
    pub total_balance: f64,
}

/// Apply the balance formula to one month.
pub fn derive_month(month: &MonthlyBalance, prev_cash: f64, prev_bank: f64) -> DerivedBalances {
    let cash_amount = prev_cash + month.income_cash - month.expense_cash - month.bill_cash;
    let bank_amount = prev_bank + month.income_bank - month.expense_bank - month.bill_bank;
    DerivedBalances {
        cash_amount,
        bank_amount,
        previous_cash_amount: prev_cash,
        previous_bank_amount: prev_bank,
        total_previous_balance: prev_cash + prev_bank,
        total_balance: cash_amount + bank_amount,
    }
}

/// Recompute every month of `user_id` at or after `start_month`, in
/// chronological order.
///
/// Months with no row are not created. The opening balance of the first
/// fetched month comes from the latest existing month strictly before it,
/// or zero when the user has no earlier history. Idempotent: re-running
/// without intervening writes leaves every row unchanged.
///
/// Returns the number of months recomputed. A failed month update surfaces
/// as `RecalculationError` naming that month, which aborts the caller's
/// transaction.
pub async fn recalculate_balances(
    conn: &mut SqliteConnection,
    user_id: &str,
    start_month: MonthKey,
) -> Result<u64, AppError> {
    let months = sqlx::query_as::<_, MonthlyBalance>(
        r#"
        SELECT user_id, year_month, income_cash, income_bank,
               expense_cash, expense_bank, bill_cash, bill_bank,
               cash_amount, bank_amount, previous_cash_amount, previous_bank_amount,
               total_previous_balance, total_balance
        FROM monthly_cash_bank_balance
        WHERE user_id = ?1 AND year_month >= ?2
        ORDER BY year_month ASC
        "#,
    )
    .bind(user_id)
    .bind(start_month.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        observe_error(AppError::StorageError(anyhow::anyhow!(
            "Failed to fetch months: {}",
            e
        )))
    })?;

    let first = match months.first() {
        Some(m) => m,
        None => return Ok(0),
    };

    // Opening balance: the chronologically preceding existing month, if any.
    let opening = sqlx::query_as::<_, (f64, f64)>(
        r#"
        SELECT cash_amount, bank_amount
        FROM monthly_cash_bank_balance
        WHERE user_id = ?1 AND year_month < ?2
        ORDER BY year_month DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(&first.year_month)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        observe_error(AppError::StorageError(anyhow::anyhow!(
            "Failed to fetch opening balance: {}",
            e
        )))
    })?;

    let (mut prev_cash, mut prev_bank) = opening.unwrap_or((0.0, 0.0));

    for month in &months {
        let derived = derive_month(month, prev_cash, prev_bank);

        sqlx::query(
            r#"
            UPDATE monthly_cash_bank_balance
            SET cash_amount = ?1,
                bank_amount = ?2,
                previous_cash_amount = ?3,
                previous_bank_amount = ?4,
                total_previous_balance = ?5,
                total_balance = ?6
            WHERE user_id = ?7 AND year_month = ?8
            "#,
        )
        .bind(derived.cash_amount)
        .bind(derived.bank_amount)
        .bind(derived.previous_cash_amount)
        .bind(derived.previous_bank_amount)
        .bind(derived.total_previous_balance)
        .bind(derived.total_balance)
        .bind(user_id)
        .bind(&month.year_month)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            observe_error(AppError::RecalculationError {
                month: month.year_month.clone(),
                source: anyhow::anyhow!("Failed to update balance: {}", e),
            })
        })?;

        prev_cash = derived.cash_amount;
        prev_bank = derived.bank_amount;
    }

    let count = months.len() as u64;
    CASCADE_MONTHS.observe(count as f64);
    debug!(
        user_id = %user_id,
        start_month = %start_month,
        months = count,
        "Cascade recomputed"
    );

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month_row(year_month: &str, income_cash: f64, income_bank: f64) -> MonthlyBalance {
        MonthlyBalance {
            user_id: "u1".to_string(),
            year_month: year_month.to_string(),
            income_cash,
            income_bank,
            expense_cash: 0.0,
            expense_bank: 0.0,
            bill_cash: 0.0,
            bill_bank: 0.0,
            cash_amount: 0.0,
            bank_amount: 0.0,
            previous_cash_amount: 0.0,
            previous_bank_amount: 0.0,
            total_previous_balance: 0.0,
            total_balance: 0.0,
        }
    }

    #[test]
    fn derive_applies_balance_formula() {
        let mut month = month_row("2024-01", 1000.0, 2000.0);
        month.expense_cash = 300.0;
        month.bill_bank = 150.0;

        let derived = derive_month(&month, 50.0, 75.0);
        assert_eq!(derived.cash_amount, 50.0 + 1000.0 - 300.0);
        assert_eq!(derived.bank_amount, 75.0 + 2000.0 - 150.0);
        assert_eq!(derived.previous_cash_amount, 50.0);
        assert_eq!(derived.previous_bank_amount, 75.0);
        assert_eq!(derived.total_previous_balance, 125.0);
        assert_eq!(derived.total_balance, derived.cash_amount + derived.bank_amount);
    }

    #[test]
    fn derive_chains_closing_into_next_opening() {
        let jan = month_row("2024-01", 100.0, 200.0);
        let feb = month_row("2024-02", 10.0, 20.0);

        let jan_derived = derive_month(&jan, 0.0, 0.0);
        let feb_derived = derive_month(&feb, jan_derived.cash_amount, jan_derived.bank_amount);

        assert_eq!(feb_derived.previous_cash_amount, 100.0);
        assert_eq!(feb_derived.previous_bank_amount, 200.0);
        assert_eq!(feb_derived.cash_amount, 110.0);
        assert_eq!(feb_derived.bank_amount, 220.0);
        assert_eq!(feb_derived.total_balance, 330.0);
    }

    #[test]
    fn derive_allows_negative_balances() {
        let mut month = month_row("2024-01", 0.0, 0.0);
        month.expense_cash = 200.0;

        let derived = derive_month(&month, 0.0, 0.0);
        assert_eq!(derived.cash_amount, -200.0);
        assert_eq!(derived.total_balance, -200.0);
    }
}
