//! Period window resolution and budget overview arithmetic.
//!
//! A request always targets the window *adjacent* to the reference date's
//! own period: `prev` resolves the window before it, `next` the one after.
//! Quarters, halves and years are aligned to January; weeks start on Monday.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{BudgetOverview, Direction, MonthKey, Period};

/// Resolve the `[start, end]` date window for a period next to `reference`.
pub fn resolve_window(
    period: Period,
    reference: NaiveDate,
    direction: Direction,
) -> (NaiveDate, NaiveDate) {
    match period {
        Period::Daily => {
            let start = match direction {
                Direction::Next => reference + Duration::days(1),
                Direction::Prev => reference - Duration::days(1),
            };
            (start, start)
        }
        Period::Weekly => {
            let monday =
                reference - Duration::days(reference.weekday().num_days_from_monday() as i64);
            let start = match direction {
                Direction::Next => monday + Duration::days(7),
                Direction::Prev => monday - Duration::days(7),
            };
            (start, start + Duration::days(6))
        }
        Period::Monthly => month_block(reference, 1, direction),
        Period::Quarterly => month_block(reference, 3, direction),
        Period::Semiannual => month_block(reference, 6, direction),
        Period::Annual => month_block(reference, 12, direction),
    }
}

/// Window for a Jan-aligned block of `span` months adjacent to `reference`.
fn month_block(reference: NaiveDate, span: i32, direction: Direction) -> (NaiveDate, NaiveDate) {
    let current = MonthKey::from_date(reference);
    // Snap to the start of the block the reference falls in.
    let aligned = current.plus_months(-((current.month() as i32 - 1) % span));
    let target = match direction {
        Direction::Next => aligned.plus_months(span),
        Direction::Prev => aligned.plus_months(-span),
    };
    (target.first_day(), target.plus_months(span - 1).last_day())
}

/// Days of the window still ahead of `reference` (inclusive of the
/// reference day itself). A window already elapsed yields zero; one not yet
/// begun yields its full length.
pub fn days_remaining_in_window(start: NaiveDate, end: NaiveDate, reference: NaiveDate) -> i64 {
    if reference > end {
        return 0;
    }
    let from = if reference < start { start } else { reference };
    (end - from).num_days() + 1
}

/// Combine the window aggregates into the overview.
///
/// `expense_percent` and `daily_rate` degrade to zero rather than dividing
/// by a non-positive total or an elapsed window.
#[allow(clippy::too_many_arguments)]
pub fn build_overview(
    user_id: &str,
    period: Period,
    start: NaiveDate,
    end: NaiveDate,
    reference: NaiveDate,
    from_previous: f64,
    total_income: f64,
    spent_amount: f64,
    upcoming_bills: f64,
) -> BudgetOverview {
    let combined_expense = spent_amount + upcoming_bills;
    let total_amount = from_previous + total_income;
    let remaining_amount = total_amount - combined_expense;

    let expense_percent = if total_amount > 0.0 {
        combined_expense / total_amount * 100.0
    } else {
        0.0
    };

    let days_remaining = days_remaining_in_window(start, end, reference);
    let daily_rate = if days_remaining > 0 {
        remaining_amount / days_remaining as f64
    } else {
        0.0
    };

    BudgetOverview {
        user_id: user_id.to_string(),
        period,
        start_date: start,
        end_date: end,
        from_previous,
        total_income,
        spent_amount,
        upcoming_bills,
        combined_expense,
        total_amount,
        remaining_amount,
        expense_percent,
        daily_rate,
    }
}
