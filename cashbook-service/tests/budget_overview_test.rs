//! Budget overview integration tests.

mod common;

use cashbook_core::error::AppError;
use chrono::NaiveDate;
use common::{add_bill, add_expense, add_income, spawn_db};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Only events dated inside the resolved window are summed.
#[tokio::test]
async fn sums_only_window_events() {
    let db = spawn_db().await;

    add_income(&db, "u1", 1000.0, "2024-02-10", "bank").await;
    add_income(&db, "u1", 777.0, "2024-01-20", "bank").await;
    add_income(&db, "u1", 555.0, "2024-03-01", "bank").await;
    add_expense(&db, "u1", 200.0, "2024-02-05", "cash").await;
    add_expense(&db, "u1", 90.0, "2024-01-31", "cash").await;
    add_bill(&db, "u1", "rent", 300.0, "2024-02-15", 1, "bank").await;

    let overview = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(overview.start_date, date(2024, 2, 1));
    assert_eq!(overview.end_date, date(2024, 2, 29), "2024 is a leap year");
    assert_eq!(overview.total_income, 1000.0);
    assert_eq!(overview.spent_amount, 200.0);
    assert_eq!(overview.upcoming_bills, 300.0);
    assert_eq!(overview.from_previous, 0.0);
    assert_eq!(overview.combined_expense, 500.0);
    assert_eq!(overview.total_amount, 1000.0);
    assert_eq!(overview.remaining_amount, 500.0);
    assert_eq!(overview.expense_percent, 50.0);
    // Reference sits before the window, so the full 29 days remain.
    assert_eq!(overview.daily_rate, 500.0 / 29.0);
}

/// The computed overview is persisted as the (user, period) record.
#[tokio::test]
async fn persists_overview_as_budget_record() {
    let db = spawn_db().await;

    add_income(&db, "u1", 1000.0, "2024-02-10", "bank").await;
    add_expense(&db, "u1", 200.0, "2024-02-05", "cash").await;

    let overview = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");

    let record = db
        .get_budget_record("u1", "monthly")
        .await
        .expect("Failed to fetch record")
        .expect("Record missing");
    assert_eq!(record.period, "monthly");
    assert_eq!(record.record_date, date(2024, 1, 15));
    assert_eq!(record.total_amount, overview.total_amount);
    assert_eq!(record.remaining_amount, overview.remaining_amount);
    assert_eq!(record.spent_amount, overview.spent_amount);
    assert_eq!(record.upcoming_amount, overview.upcoming_bills);
    assert_eq!(record.from_previous, overview.from_previous);
    assert_eq!(record.total_income, overview.total_income);
    assert_eq!(record.daily_rate, overview.daily_rate);
}

/// Bills already fully paid do not count toward upcoming commitments.
#[tokio::test]
async fn upcoming_counts_only_unpaid_bills() {
    let db = spawn_db().await;

    add_bill(&db, "u1", "rent", 300.0, "2024-02-15", 1, "bank").await;
    let settled = add_bill(&db, "u1", "net", 120.0, "2024-02-20", 1, "bank").await;
    db.mark_bill_paid("u1", settled.id, "2024-02")
        .await
        .expect("Failed to mark paid");

    let overview = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(overview.upcoming_bills, 300.0);
}

/// A later run inherits the stored remainder and overwrites the record.
#[tokio::test]
async fn inherits_previous_remaining_and_upserts() {
    let db = spawn_db().await;

    add_income(&db, "u1", 1000.0, "2024-02-10", "bank").await;
    let first = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");
    assert_eq!(first.remaining_amount, 1000.0);

    add_expense(&db, "u1", 400.0, "2024-03-10", "cash").await;
    let second = db
        .calculate_budget_overview("u1", "monthly", "2024-02-15", "next")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(second.from_previous, 1000.0);
    assert_eq!(second.total_income, 0.0);
    assert_eq!(second.spent_amount, 400.0);
    assert_eq!(second.total_amount, 1000.0);
    assert_eq!(second.remaining_amount, 600.0);
    assert_eq!(second.expense_percent, 40.0);

    // One record per (user, period); the second run replaced the first.
    let record = db
        .get_budget_record("u1", "monthly")
        .await
        .expect("Failed to fetch record")
        .expect("Record missing");
    assert_eq!(record.record_date, date(2024, 2, 15));
    assert_eq!(record.remaining_amount, 600.0);
}

#[tokio::test]
async fn periods_keep_independent_records() {
    let db = spawn_db().await;

    add_income(&db, "u1", 700.0, "2024-02-10", "bank").await;
    db.calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");
    db.calculate_budget_overview("u1", "annual", "2023-06-15", "next")
        .await
        .expect("Failed to calculate overview");

    let monthly = db
        .get_budget_record("u1", "monthly")
        .await
        .expect("Failed to fetch record")
        .expect("Record missing");
    let annual = db
        .get_budget_record("u1", "annual")
        .await
        .expect("Failed to fetch record")
        .expect("Record missing");

    assert_eq!(monthly.total_income, 700.0);
    assert_eq!(annual.total_income, 700.0, "2024 window catches the income");
    assert_eq!(monthly.record_date, date(2024, 1, 15));
    assert_eq!(annual.record_date, date(2023, 6, 15));
}

/// An empty ledger produces a zeroed overview, not a division fault.
#[tokio::test]
async fn zero_total_yields_zero_percent() {
    let db = spawn_db().await;

    let overview = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "next")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(overview.total_amount, 0.0);
    assert_eq!(overview.expense_percent, 0.0);
    assert_eq!(overview.daily_rate, 0.0);
}

/// A window entirely in the past has no days left to spread spending over.
#[tokio::test]
async fn elapsed_window_zeroes_daily_rate() {
    let db = spawn_db().await;

    add_income(&db, "u1", 600.0, "2023-12-10", "bank").await;

    let overview = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "prev")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(overview.start_date, date(2023, 12, 1));
    assert_eq!(overview.end_date, date(2023, 12, 31));
    assert_eq!(overview.total_income, 600.0);
    assert_eq!(overview.remaining_amount, 600.0);
    assert_eq!(overview.daily_rate, 0.0);
}

#[tokio::test]
async fn weekly_window_resolves_monday_aligned() {
    let db = spawn_db().await;

    // 2024-03-13 is a Wednesday; next week runs Mon 18th to Sun 24th.
    add_income(&db, "u1", 50.0, "2024-03-20", "cash").await;
    add_income(&db, "u1", 60.0, "2024-03-25", "cash").await;

    let overview = db
        .calculate_budget_overview("u1", "weekly", "2024-03-13", "next")
        .await
        .expect("Failed to calculate overview");

    assert_eq!(overview.start_date, date(2024, 3, 18));
    assert_eq!(overview.end_date, date(2024, 3, 24));
    assert_eq!(overview.total_income, 50.0);
}

#[tokio::test]
async fn rejects_bad_period_direction_and_date() {
    let db = spawn_db().await;

    let err = db
        .calculate_budget_overview("u1", "fortnight", "2024-01-15", "next")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = db
        .calculate_budget_overview("u1", "monthly", "2024-01-15", "sideways")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = db
        .calculate_budget_overview("u1", "monthly", "15-01-2024", "next")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DateFormatError(_)));

    let err = db.get_budget_record("u1", "fortnight").await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let absent = db
        .get_budget_record("u1", "monthly")
        .await
        .expect("Failed to fetch record");
    assert!(absent.is_none());
}
