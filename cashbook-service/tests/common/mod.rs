//! Common test utilities for cashbook-service integration tests.

#![allow(dead_code)]

use cashbook_service::models::{
    Bill, Expense, Income, MonthlyBalance, NewBill, NewExpense, NewIncome,
};
use cashbook_service::services::Database;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,cashbook_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Spawn a fresh in-memory database with migrations applied.
///
/// A single pooled connection keeps the memory database alive for the
/// whole test.
pub async fn spawn_db() -> Database {
    init_tracing();

    let db = Database::new("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to create database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");
    db
}

/// Build an income input with empty category and description.
pub fn income_input(user_id: &str, amount: f64, date: &str, method: &str) -> NewIncome {
    NewIncome {
        user_id: user_id.to_string(),
        amount,
        date: date.to_string(),
        payment_method: method.to_string(),
        category: String::new(),
        description: String::new(),
    }
}

/// Build an expense input with empty category and description.
pub fn expense_input(user_id: &str, amount: f64, date: &str, method: &str) -> NewExpense {
    NewExpense {
        user_id: user_id.to_string(),
        amount,
        date: date.to_string(),
        payment_method: method.to_string(),
        category: String::new(),
        description: String::new(),
    }
}

/// Build a bill input due on the first of its month.
pub fn bill_input(
    user_id: &str,
    name: &str,
    amount: f64,
    due_date: &str,
    duration_months: i64,
    method: &str,
) -> NewBill {
    NewBill {
        user_id: user_id.to_string(),
        name: name.to_string(),
        amount,
        due_date: due_date.to_string(),
        payment_day: 1,
        duration_months,
        payment_method: method.to_string(),
        category: String::new(),
        icon: String::new(),
        regularity: String::new(),
    }
}

/// Record an income event, panicking on failure.
pub async fn add_income(
    db: &Database,
    user_id: &str,
    amount: f64,
    date: &str,
    method: &str,
) -> Income {
    db.add_income(&income_input(user_id, amount, date, method))
        .await
        .expect("Failed to add income")
}

/// Record an expense event, panicking on failure.
pub async fn add_expense(
    db: &Database,
    user_id: &str,
    amount: f64,
    date: &str,
    method: &str,
) -> Expense {
    db.add_expense(&expense_input(user_id, amount, date, method))
        .await
        .expect("Failed to add expense")
}

/// Record a bill, panicking on failure.
pub async fn add_bill(
    db: &Database,
    user_id: &str,
    name: &str,
    amount: f64,
    due_date: &str,
    duration_months: i64,
    method: &str,
) -> Bill {
    db.add_bill(&bill_input(
        user_id,
        name,
        amount,
        due_date,
        duration_months,
        method,
    ))
    .await
    .expect("Failed to add bill")
}

/// Fetch a month's balance row, panicking if absent.
pub async fn month_balance(db: &Database, user_id: &str, year_month: &str) -> MonthlyBalance {
    db.get_monthly_balance(user_id, year_month)
        .await
        .expect("Failed to fetch monthly balance")
        .unwrap_or_else(|| panic!("No balance row for {}", year_month))
}
