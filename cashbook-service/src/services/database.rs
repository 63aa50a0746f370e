//! Database service for cashbook-service.
//!
//! Every mutation runs behind the owning user's lock and inside a single
//! transaction: the event row, the month accumulator bump, and the balance
//! cascade commit together or not at all.

use crate::models::{
    Bill, BillPayment, BillWithStatus, BudgetOverview, BudgetRecord, Direction, Expense, Income,
    MonthKey, MonthlyBalance, NewBill, NewExpense, NewIncome, PaymentMethod, Period, UpdateBill,
    UpdateExpense, UpdateIncome,
};
use crate::services::metrics::{observe_error, DB_QUERY_DURATION, EVENTS_TOTAL, OVERVIEWS_TOTAL};
use crate::services::user_locks::UserLocks;
use crate::services::{budget, cascade};
use cashbook_core::error::AppError;
use chrono::{Datelike, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Upper bound on bill amortization length.
const MAX_BILL_DURATION_MONTHS: i64 = 1200;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    user_locks: UserLocks,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "cashbook-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| storage_error("Invalid database URL", e))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to connect", e))?;

        info!("SQLite connection pool established");

        Ok(Self {
            pool,
            user_locks: UserLocks::new(),
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Health check failed", e))?;
        Ok(())
    }

    /// Run pending migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| storage_error("Migration failed", e))?;
        info!("Database migrations applied");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Income & Expense Operations
    // -------------------------------------------------------------------------

    /// Record an income event and fold it into the owning month's balance.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn add_income(&self, input: &NewIncome) -> Result<Income, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_income"])
            .start_timer();

        // NaN and infinities fail closed
        if !input.amount.is_finite() || input.amount <= 0.0 {
            return Err(validation_error(format!(
                "Income amount must be positive, got {}",
                input.amount
            )));
        }
        let method = parse_method(&input.payment_method)?;
        let date = parse_event_date(&input.date)?;
        let month = MonthKey::from_date(date);
        let month_key = month.to_string();

        let lock = self.user_locks.for_user(&input.user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let income = sqlx::query_as::<_, Income>(
            r#"
            INSERT INTO incomes (user_id, amount, date, payment_method, category, description, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, user_id, amount, date, payment_method, category, description, created_utc
            "#,
        )
        .bind(&input.user_id)
        .bind(input.amount)
        .bind(date)
        .bind(method.as_str())
        .bind(&input.category)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to insert income", e))?;

        ensure_month_row(&mut *tx, &input.user_id, &month_key).await?;
        bump_income(&mut *tx, &input.user_id, &month_key, method, input.amount).await?;
        cascade::recalculate_balances(&mut *tx, &input.user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL.with_label_values(&["income", "ok"]).inc();

        info!(
            income_id = income.id,
            month = %month_key,
            amount = income.amount,
            method = %method,
            "Income recorded"
        );

        Ok(income)
    }

    /// Record an expense event and fold it into the owning month's balance.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn add_expense(&self, input: &NewExpense) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_expense"])
            .start_timer();

        // NaN and infinities fail closed
        if !input.amount.is_finite() || input.amount <= 0.0 {
            return Err(validation_error(format!(
                "Expense amount must be positive, got {}",
                input.amount
            )));
        }
        let method = parse_method(&input.payment_method)?;
        let date = parse_event_date(&input.date)?;
        let month = MonthKey::from_date(date);
        let month_key = month.to_string();

        let lock = self.user_locks.for_user(&input.user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (user_id, amount, date, payment_method, category, description, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, user_id, amount, date, payment_method, category, description, created_utc
            "#,
        )
        .bind(&input.user_id)
        .bind(input.amount)
        .bind(date)
        .bind(method.as_str())
        .bind(&input.category)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to insert expense", e))?;

        ensure_month_row(&mut *tx, &input.user_id, &month_key).await?;
        bump_expense(&mut *tx, &input.user_id, &month_key, method, input.amount).await?;
        cascade::recalculate_balances(&mut *tx, &input.user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL.with_label_values(&["expense", "ok"]).inc();

        info!(
            expense_id = expense.id,
            month = %month_key,
            amount = expense.amount,
            method = %method,
            "Expense recorded"
        );

        Ok(expense)
    }

    /// Delete an income event, reversing its accumulator contribution.
    #[instrument(skip(self), fields(user_id = %user_id, income_id = income_id))]
    pub async fn delete_income(&self, user_id: &str, income_id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_income"])
            .start_timer();

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let income = sqlx::query_as::<_, Income>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM incomes
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(income_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch income", e))?
        .ok_or_else(|| not_found(format!("Income {} not found", income_id)))?;

        let method = income.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Income {} has unknown payment method '{}'",
                income.id,
                income.payment_method
            )))
        })?;
        let month = MonthKey::from_date(income.date);
        let month_key = month.to_string();

        sqlx::query("DELETE FROM incomes WHERE id = ?1")
            .bind(income.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete income", e))?;

        bump_income(&mut *tx, user_id, &month_key, method, -income.amount).await?;
        cascade::recalculate_balances(&mut *tx, user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL
            .with_label_values(&["income_delete", "ok"])
            .inc();

        info!(month = %month_key, amount = income.amount, "Income deleted");

        Ok(())
    }

    /// Delete an expense event, reversing its accumulator contribution.
    #[instrument(skip(self), fields(user_id = %user_id, expense_id = expense_id))]
    pub async fn delete_expense(&self, user_id: &str, expense_id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_expense"])
            .start_timer();

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM expenses
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(expense_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch expense", e))?
        .ok_or_else(|| not_found(format!("Expense {} not found", expense_id)))?;

        let method = expense.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Expense {} has unknown payment method '{}'",
                expense.id,
                expense.payment_method
            )))
        })?;
        let month = MonthKey::from_date(expense.date);
        let month_key = month.to_string();

        sqlx::query("DELETE FROM expenses WHERE id = ?1")
            .bind(expense.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete expense", e))?;

        bump_expense(&mut *tx, user_id, &month_key, method, -expense.amount).await?;
        cascade::recalculate_balances(&mut *tx, user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL
            .with_label_values(&["expense_delete", "ok"])
            .inc();

        info!(month = %month_key, amount = expense.amount, "Expense deleted");

        Ok(())
    }

    /// Apply a partial update to an income event. `None` fields keep their
    /// stored values; a change of amount, method, or owning month re-points
    /// the accumulator contribution and recascades from the earlier month.
    #[instrument(skip(self, update), fields(user_id = %user_id, income_id = income_id))]
    pub async fn update_income(
        &self,
        user_id: &str,
        income_id: i64,
        update: &UpdateIncome,
    ) -> Result<Income, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_income"])
            .start_timer();

        // NaN and infinities fail closed
        if let Some(amount) = update.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(validation_error(format!(
                    "Income amount must be positive, got {}",
                    amount
                )));
            }
        }
        let new_method = match update.payment_method.as_deref() {
            Some(m) => Some(parse_method(m)?),
            None => None,
        };
        let new_date = match update.date.as_deref() {
            Some(d) => Some(parse_event_date(d)?),
            None => None,
        };

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let old = sqlx::query_as::<_, Income>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM incomes
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(income_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch income", e))?
        .ok_or_else(|| not_found(format!("Income {} not found", income_id)))?;

        let old_method = old.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Income {} has unknown payment method '{}'",
                old.id,
                old.payment_method
            )))
        })?;

        let amount = update.amount.unwrap_or(old.amount);
        let method = new_method.unwrap_or(old_method);
        let date = new_date.unwrap_or(old.date);
        let category = update.category.as_deref().unwrap_or(&old.category);
        let description = update.description.as_deref().unwrap_or(&old.description);

        let income = sqlx::query_as::<_, Income>(
            r#"
            UPDATE incomes
            SET amount = ?1, date = ?2, payment_method = ?3, category = ?4, description = ?5
            WHERE id = ?6
            RETURNING id, user_id, amount, date, payment_method, category, description, created_utc
            "#,
        )
        .bind(amount)
        .bind(date)
        .bind(method.as_str())
        .bind(category)
        .bind(description)
        .bind(old.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to update income", e))?;

        let old_month = MonthKey::from_date(old.date);
        let new_month = MonthKey::from_date(date);

        // Only an amount, method, or owning-month change touches the ledger.
        if amount != old.amount || method != old_method || new_month != old_month {
            let old_key = old_month.to_string();
            let new_key = new_month.to_string();
            bump_income(&mut *tx, user_id, &old_key, old_method, -old.amount).await?;
            ensure_month_row(&mut *tx, user_id, &new_key).await?;
            bump_income(&mut *tx, user_id, &new_key, method, amount).await?;
            cascade::recalculate_balances(&mut *tx, user_id, old_month.min(new_month)).await?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL
            .with_label_values(&["income_update", "ok"])
            .inc();

        info!(
            income_id = income.id,
            old_month = %old_month,
            new_month = %new_month,
            amount = income.amount,
            method = %method,
            "Income updated"
        );

        Ok(income)
    }

    /// Apply a partial update to an expense event. Same contract as
    /// `update_income`, on the `expense_*` accumulators.
    #[instrument(skip(self, update), fields(user_id = %user_id, expense_id = expense_id))]
    pub async fn update_expense(
        &self,
        user_id: &str,
        expense_id: i64,
        update: &UpdateExpense,
    ) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_expense"])
            .start_timer();

        // NaN and infinities fail closed
        if let Some(amount) = update.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(validation_error(format!(
                    "Expense amount must be positive, got {}",
                    amount
                )));
            }
        }
        let new_method = match update.payment_method.as_deref() {
            Some(m) => Some(parse_method(m)?),
            None => None,
        };
        let new_date = match update.date.as_deref() {
            Some(d) => Some(parse_event_date(d)?),
            None => None,
        };

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let old = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM expenses
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(expense_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch expense", e))?
        .ok_or_else(|| not_found(format!("Expense {} not found", expense_id)))?;

        let old_method = old.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Expense {} has unknown payment method '{}'",
                old.id,
                old.payment_method
            )))
        })?;

        let amount = update.amount.unwrap_or(old.amount);
        let method = new_method.unwrap_or(old_method);
        let date = new_date.unwrap_or(old.date);
        let category = update.category.as_deref().unwrap_or(&old.category);
        let description = update.description.as_deref().unwrap_or(&old.description);

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expenses
            SET amount = ?1, date = ?2, payment_method = ?3, category = ?4, description = ?5
            WHERE id = ?6
            RETURNING id, user_id, amount, date, payment_method, category, description, created_utc
            "#,
        )
        .bind(amount)
        .bind(date)
        .bind(method.as_str())
        .bind(category)
        .bind(description)
        .bind(old.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to update expense", e))?;

        let old_month = MonthKey::from_date(old.date);
        let new_month = MonthKey::from_date(date);

        // Only an amount, method, or owning-month change touches the ledger.
        if amount != old.amount || method != old_method || new_month != old_month {
            let old_key = old_month.to_string();
            let new_key = new_month.to_string();
            bump_expense(&mut *tx, user_id, &old_key, old_method, -old.amount).await?;
            ensure_month_row(&mut *tx, user_id, &new_key).await?;
            bump_expense(&mut *tx, user_id, &new_key, method, amount).await?;
            cascade::recalculate_balances(&mut *tx, user_id, old_month.min(new_month)).await?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL
            .with_label_values(&["expense_update", "ok"])
            .inc();

        info!(
            expense_id = expense.id,
            old_month = %old_month,
            new_month = %new_month,
            amount = expense.amount,
            method = %method,
            "Expense updated"
        );

        Ok(expense)
    }

    /// List income events for a user, most recent first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_incomes(&self, user_id: &str) -> Result<Vec<Income>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_incomes"])
            .start_timer();

        let incomes = sqlx::query_as::<_, Income>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM incomes
            WHERE user_id = ?1
            ORDER BY date DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list incomes", e))?;

        timer.observe_duration();
        Ok(incomes)
    }

    /// List expense events for a user, most recent first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_expenses"])
            .start_timer();

        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, date, payment_method, category, description, created_utc
            FROM expenses
            WHERE user_id = ?1
            ORDER BY date DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list expenses", e))?;

        timer.observe_duration();
        Ok(expenses)
    }

    // -------------------------------------------------------------------------
    // Bill Operations
    // -------------------------------------------------------------------------

    /// Record a recurring bill and amortize it over its duration.
    ///
    /// Creates one unpaid `BillPayment` per month starting at the due date's
    /// month, and adds the bill amount to each of those months' `bill_*`
    /// accumulators.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, name = %input.name))]
    pub async fn add_bill(&self, input: &NewBill) -> Result<Bill, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_bill"])
            .start_timer();

        // NaN and infinities fail closed
        if !input.amount.is_finite() || input.amount <= 0.0 {
            return Err(validation_error(format!(
                "Bill amount must be positive, got {}",
                input.amount
            )));
        }
        if input.duration_months < 1 {
            return Err(validation_error(format!(
                "Bill duration must be at least 1 month, got {}",
                input.duration_months
            )));
        }
        if input.duration_months > MAX_BILL_DURATION_MONTHS {
            return Err(validation_error(format!(
                "Bill duration must be at most {} months, got {}",
                MAX_BILL_DURATION_MONTHS,
                input.duration_months
            )));
        }
        if !(1..=28).contains(&input.payment_day) {
            return Err(validation_error(format!(
                "Payment day must be between 1 and 28, got {}",
                input.payment_day
            )));
        }
        let method = parse_method(&input.payment_method)?;
        let due_date = parse_event_date(&input.due_date)?;
        let first_month = MonthKey::from_date(due_date);

        let icon = if input.icon.is_empty() {
            "bill"
        } else {
            input.icon.as_str()
        };
        let regularity = if input.regularity.is_empty() {
            "monthly"
        } else {
            input.regularity.as_str()
        };

        let lock = self.user_locks.for_user(&input.user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let now = Utc::now();
        let bill = sqlx::query_as::<_, Bill>(
            r#"
            INSERT INTO bills (
                user_id, name, amount, due_date, payment_day, duration_months,
                payment_method, category, icon, regularity, paid, created_utc, updated_utc
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12)
            RETURNING id, user_id, name, amount, due_date, payment_day, duration_months,
                      payment_method, category, icon, regularity, paid, created_utc, updated_utc
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.name)
        .bind(input.amount)
        .bind(due_date)
        .bind(input.payment_day)
        .bind(input.duration_months)
        .bind(method.as_str())
        .bind(&input.category)
        .bind(icon)
        .bind(regularity)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to insert bill", e))?;

        for i in 0..input.duration_months {
            let month_key = first_month.plus_months(i as i32).to_string();

            sqlx::query(
                r#"
                INSERT INTO bill_payments (bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc)
                VALUES (?1, ?2, ?3, 0, NULL, ?4, ?5)
                "#,
            )
            .bind(bill.id)
            .bind(&input.user_id)
            .bind(&month_key)
            .bind(method.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                storage_error(&format!("Failed to insert bill payment for {}", month_key), e)
            })?;

            ensure_month_row(&mut *tx, &input.user_id, &month_key).await?;
            bump_bill(&mut *tx, &input.user_id, &month_key, method, input.amount).await?;
        }

        cascade::recalculate_balances(&mut *tx, &input.user_id, first_month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL.with_label_values(&["bill", "ok"]).inc();

        info!(
            bill_id = bill.id,
            first_month = %first_month,
            months = bill.duration_months,
            amount = bill.amount,
            method = %method,
            "Bill recorded"
        );

        Ok(bill)
    }

    /// Mark one month's payment of a bill as paid.
    ///
    /// The paid amount leaves that month's `bill_*` accumulator and is never
    /// re-added to `expense_*`; the money was already reserved when the bill
    /// was recorded. Marks the bill itself paid once every payment is.
    #[instrument(skip(self), fields(user_id = %user_id, bill_id = bill_id, year_month = %year_month))]
    pub async fn mark_bill_paid(
        &self,
        user_id: &str,
        bill_id: i64,
        year_month: &str,
    ) -> Result<BillPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_bill_paid"])
            .start_timer();

        let month: MonthKey = year_month.parse().map_err(observe_error)?;
        let month_key = month.to_string();

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, user_id, name, amount, due_date, payment_day, duration_months,
                   payment_method, category, icon, regularity, paid, created_utc, updated_utc
            FROM bills
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch bill", e))?
        .ok_or_else(|| not_found(format!("Bill {} not found", bill_id)))?;

        let method = bill.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Bill {} has unknown payment method '{}'",
                bill.id,
                bill.payment_method
            )))
        })?;

        let payment = sqlx::query_as::<_, BillPayment>(
            r#"
            SELECT id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
            FROM bill_payments
            WHERE bill_id = ?1 AND year_month = ?2
            "#,
        )
        .bind(bill_id)
        .bind(&month_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch payment", e))?
        .ok_or_else(|| not_found(format!("No payment for bill {} in {}", bill_id, month_key)))?;

        if payment.paid {
            return Err(observe_error(AppError::AlreadyPaidError(anyhow::anyhow!(
                "Bill {} is already paid for {}",
                bill_id,
                month_key
            ))));
        }

        let payment = sqlx::query_as::<_, BillPayment>(
            r#"
            UPDATE bill_payments
            SET paid = 1, payment_date = ?1
            WHERE id = ?2
            RETURNING id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
            "#,
        )
        .bind(Utc::now().date_naive())
        .bind(payment.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to mark payment paid", e))?;

        bump_bill(&mut *tx, user_id, &month_key, method, -bill.amount).await?;

        let (total, paid_count): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(paid), 0) FROM bill_payments WHERE bill_id = ?1",
        )
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to count payments", e))?;

        let complete = total > 0 && paid_count >= total;
        if complete {
            sqlx::query("UPDATE bills SET paid = 1, updated_utc = ?1 WHERE id = ?2 AND user_id = ?3")
                .bind(Utc::now())
                .bind(bill_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to close out bill", e))?;
        }

        cascade::recalculate_balances(&mut *tx, user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL
            .with_label_values(&["bill_payment", "ok"])
            .inc();

        info!(
            payment_id = payment.id,
            month = %month_key,
            amount = bill.amount,
            bill_complete = complete,
            "Bill payment recorded"
        );

        Ok(payment)
    }

    /// Delete a bill and its payment schedule, reversing the accumulator
    /// contribution of every still-unpaid month.
    #[instrument(skip(self), fields(user_id = %user_id, bill_id = bill_id))]
    pub async fn delete_bill(&self, user_id: &str, bill_id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_bill"])
            .start_timer();

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, user_id, name, amount, due_date, payment_day, duration_months,
                   payment_method, category, icon, regularity, paid, created_utc, updated_utc
            FROM bills
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch bill", e))?
        .ok_or_else(|| not_found(format!("Bill {} not found", bill_id)))?;

        let method = bill.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Bill {} has unknown payment method '{}'",
                bill.id,
                bill.payment_method
            )))
        })?;

        let payments = sqlx::query_as::<_, BillPayment>(
            r#"
            SELECT id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
            FROM bill_payments
            WHERE bill_id = ?1
            ORDER BY year_month ASC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch payments", e))?;

        // Paid months already released their reservation in mark_bill_paid.
        for payment in payments.iter().filter(|p| !p.paid) {
            bump_bill(&mut *tx, user_id, &payment.year_month, method, -bill.amount).await?;
        }

        sqlx::query("DELETE FROM bill_payments WHERE bill_id = ?1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete payments", e))?;

        sqlx::query("DELETE FROM bills WHERE id = ?1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete bill", e))?;

        if let Some(first) = payments.first() {
            let first_month: MonthKey = first.year_month.parse().map_err(|_| {
                observe_error(AppError::StorageError(anyhow::anyhow!(
                    "Bill {} has malformed payment month '{}'",
                    bill_id,
                    first.year_month
                )))
            })?;
            cascade::recalculate_balances(&mut *tx, user_id, first_month).await?;
        }

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL.with_label_values(&["bill_delete", "ok"]).inc();

        info!(
            months = payments.len(),
            amount = bill.amount,
            "Bill deleted"
        );

        Ok(())
    }

    /// Apply a partial update to a bill. `None` fields keep their stored
    /// values. An amount or method change re-reserves every still-unpaid
    /// payment month; paid months keep their released state. The schedule
    /// shape (due date, duration, payment day) is fixed at creation.
    #[instrument(skip(self, update), fields(user_id = %user_id, bill_id = bill_id))]
    pub async fn update_bill(
        &self,
        user_id: &str,
        bill_id: i64,
        update: &UpdateBill,
    ) -> Result<Bill, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_bill"])
            .start_timer();

        // NaN and infinities fail closed
        if let Some(amount) = update.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(validation_error(format!(
                    "Bill amount must be positive, got {}",
                    amount
                )));
            }
        }
        let new_method = match update.payment_method.as_deref() {
            Some(m) => Some(parse_method(m)?),
            None => None,
        };

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let old = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, user_id, name, amount, due_date, payment_day, duration_months,
                   payment_method, category, icon, regularity, paid, created_utc, updated_utc
            FROM bills
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch bill", e))?
        .ok_or_else(|| not_found(format!("Bill {} not found", bill_id)))?;

        let old_method = old.parsed_method().ok_or_else(|| {
            observe_error(AppError::StorageError(anyhow::anyhow!(
                "Bill {} has unknown payment method '{}'",
                old.id,
                old.payment_method
            )))
        })?;

        let amount = update.amount.unwrap_or(old.amount);
        let method = new_method.unwrap_or(old_method);
        let name = update.name.as_deref().unwrap_or(&old.name);
        let category = update.category.as_deref().unwrap_or(&old.category);
        let icon = update.icon.as_deref().unwrap_or(&old.icon);
        let regularity = update.regularity.as_deref().unwrap_or(&old.regularity);

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            UPDATE bills
            SET name = ?1, amount = ?2, payment_method = ?3, category = ?4,
                icon = ?5, regularity = ?6, updated_utc = ?7
            WHERE id = ?8
            RETURNING id, user_id, name, amount, due_date, payment_day, duration_months,
                      payment_method, category, icon, regularity, paid, created_utc, updated_utc
            "#,
        )
        .bind(name)
        .bind(amount)
        .bind(method.as_str())
        .bind(category)
        .bind(icon)
        .bind(regularity)
        .bind(Utc::now())
        .bind(old.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to update bill", e))?;

        let mut repriced = 0usize;
        if amount != old.amount || method != old_method {
            let unpaid = sqlx::query_as::<_, BillPayment>(
                r#"
                SELECT id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
                FROM bill_payments
                WHERE bill_id = ?1 AND paid = 0
                ORDER BY year_month ASC
                "#,
            )
            .bind(bill_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to fetch payments", e))?;

            // Paid months already released their reservation in mark_bill_paid.
            for payment in &unpaid {
                bump_bill(&mut *tx, user_id, &payment.year_month, old_method, -old.amount).await?;
                bump_bill(&mut *tx, user_id, &payment.year_month, method, amount).await?;
            }

            if method != old_method {
                sqlx::query(
                    "UPDATE bill_payments SET payment_method = ?1 WHERE bill_id = ?2 AND paid = 0",
                )
                .bind(method.as_str())
                .bind(bill_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to retag payments", e))?;
            }

            if let Some(first) = unpaid.first() {
                let first_month: MonthKey = first.year_month.parse().map_err(|_| {
                    observe_error(AppError::StorageError(anyhow::anyhow!(
                        "Bill {} has malformed payment month '{}'",
                        bill_id,
                        first.year_month
                    )))
                })?;
                cascade::recalculate_balances(&mut *tx, user_id, first_month).await?;
            }
            repriced = unpaid.len();
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        EVENTS_TOTAL.with_label_values(&["bill_update", "ok"]).inc();

        info!(
            bill_id = bill.id,
            months = repriced,
            amount = bill.amount,
            method = %method,
            "Bill updated"
        );

        Ok(bill)
    }

    /// Fetch a single bill scoped to its owner.
    #[instrument(skip(self), fields(user_id = %user_id, bill_id = bill_id))]
    pub async fn get_bill(&self, user_id: &str, bill_id: i64) -> Result<Option<Bill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, user_id, name, amount, due_date, payment_day, duration_months,
                   payment_method, category, icon, regularity, paid, created_utc, updated_utc
            FROM bills
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to fetch bill", e))?;

        timer.observe_duration();
        Ok(bill)
    }

    /// List a user's bills with overdue status derived against `as_of_date`
    /// (defaults to today).
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_bills(
        &self,
        user_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> Result<Vec<BillWithStatus>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bills"])
            .start_timer();

        let as_of = as_of_date.unwrap_or_else(|| Utc::now().date_naive());

        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, user_id, name, amount, due_date, payment_day, duration_months,
                   payment_method, category, icon, regularity, paid, created_utc, updated_utc
            FROM bills
            WHERE user_id = ?1
            ORDER BY due_date ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list bills", e))?;

        timer.observe_duration();
        Ok(bills
            .into_iter()
            .map(|b| BillWithStatus::derive(b, as_of))
            .collect())
    }

    /// List the payment schedule of one bill, oldest month first.
    #[instrument(skip(self), fields(user_id = %user_id, bill_id = bill_id))]
    pub async fn list_bill_payments(
        &self,
        user_id: &str,
        bill_id: i64,
    ) -> Result<Vec<BillPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bill_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, BillPayment>(
            r#"
            SELECT id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
            FROM bill_payments
            WHERE bill_id = ?1 AND user_id = ?2
            ORDER BY year_month ASC
            "#,
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    /// List a user's unpaid bill payments falling due in one month.
    #[instrument(skip(self), fields(user_id = %user_id, year_month = %year_month))]
    pub async fn list_unpaid_payments_due(
        &self,
        user_id: &str,
        year_month: &str,
    ) -> Result<Vec<BillPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unpaid_payments_due"])
            .start_timer();

        let month: MonthKey = year_month.parse().map_err(observe_error)?;

        let payments = sqlx::query_as::<_, BillPayment>(
            r#"
            SELECT id, bill_id, user_id, year_month, paid, payment_date, payment_method, created_utc
            FROM bill_payments
            WHERE user_id = ?1 AND year_month = ?2 AND paid = 0
            ORDER BY bill_id ASC
            "#,
        )
        .bind(user_id)
        .bind(month.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list unpaid payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    // -------------------------------------------------------------------------
    // Balance Operations
    // -------------------------------------------------------------------------

    /// Fetch one month's balance row, if the user has any events in it.
    #[instrument(skip(self), fields(user_id = %user_id, year_month = %year_month))]
    pub async fn get_monthly_balance(
        &self,
        user_id: &str,
        year_month: &str,
    ) -> Result<Option<MonthlyBalance>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_monthly_balance"])
            .start_timer();

        let month: MonthKey = year_month.parse().map_err(observe_error)?;

        let balance = sqlx::query_as::<_, MonthlyBalance>(
            r#"
            SELECT user_id, year_month, income_cash, income_bank,
                   expense_cash, expense_bank, bill_cash, bill_bank,
                   cash_amount, bank_amount, previous_cash_amount, previous_bank_amount,
                   total_previous_balance, total_balance
            FROM monthly_cash_bank_balance
            WHERE user_id = ?1 AND year_month = ?2
            "#,
        )
        .bind(user_id)
        .bind(month.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to fetch monthly balance", e))?;

        timer.observe_duration();
        Ok(balance)
    }

    /// List a user's month rows in chronological order.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_monthly_balances(
        &self,
        user_id: &str,
    ) -> Result<Vec<MonthlyBalance>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_monthly_balances"])
            .start_timer();

        let balances = sqlx::query_as::<_, MonthlyBalance>(
            r#"
            SELECT user_id, year_month, income_cash, income_bank,
                   expense_cash, expense_bank, bill_cash, bill_bank,
                   cash_amount, bank_amount, previous_cash_amount, previous_bank_amount,
                   total_previous_balance, total_balance
            FROM monthly_cash_bank_balance
            WHERE user_id = ?1
            ORDER BY year_month ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list monthly balances", e))?;

        timer.observe_duration();
        Ok(balances)
    }

    /// Recompute the balance chain from `start_month` forward.
    ///
    /// Every mutation already cascades in its own transaction; this entry
    /// point repairs the chain after out-of-band edits.
    #[instrument(skip(self), fields(user_id = %user_id, start_month = %start_month))]
    pub async fn recalculate_from(&self, user_id: &str, start_month: &str) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recalculate_from"])
            .start_timer();

        let month: MonthKey = start_month.parse().map_err(observe_error)?;

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let months = cascade::recalculate_balances(&mut *tx, user_id, month).await?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        info!(months = months, "Balance chain recomputed");

        Ok(months)
    }

    // -------------------------------------------------------------------------
    // Budget Operations
    // -------------------------------------------------------------------------

    /// Compute the budget overview for the window adjacent to
    /// `reference_date` and persist it as the (user, period) budget record.
    #[instrument(skip(self), fields(user_id = %user_id, period = %period, direction = %direction))]
    pub async fn calculate_budget_overview(
        &self,
        user_id: &str,
        period: &str,
        reference_date: &str,
        direction: &str,
    ) -> Result<BudgetOverview, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["calculate_budget_overview"])
            .start_timer();

        let period = Period::parse(period)
            .ok_or_else(|| validation_error(format!("Unknown period '{}'", period)))?;
        let direction = Direction::parse(direction)
            .ok_or_else(|| validation_error(format!("Unknown direction '{}'", direction)))?;
        let reference = parse_event_date(reference_date)?;
        let (start, end) = budget::resolve_window(period, reference, direction);

        let lock = self.user_locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let total_income: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0.0) FROM incomes WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to sum incomes", e))?;

        let spent_amount: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0.0) FROM expenses WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to sum expenses", e))?;

        let upcoming_bills: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0.0) FROM bills WHERE user_id = ?1 AND paid = 0 AND due_date BETWEEN ?2 AND ?3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to sum upcoming bills", e))?;

        // Prior unspent remainder carried into this window.
        let from_previous: f64 = sqlx::query_scalar(
            "SELECT remaining_amount FROM budget_records WHERE user_id = ?1 AND period = ?2",
        )
        .bind(user_id)
        .bind(period.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to fetch budget record", e))?
        .unwrap_or(0.0);

        let overview = budget::build_overview(
            user_id,
            period,
            start,
            end,
            reference,
            from_previous,
            total_income,
            spent_amount,
            upcoming_bills,
        );

        sqlx::query(
            r#"
            INSERT INTO budget_records (
                user_id, period, record_date, total_amount, remaining_amount,
                spent_amount, upcoming_amount, from_previous, expense_percent,
                total_income, daily_rate, updated_utc
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (user_id, period) DO UPDATE SET
                record_date = excluded.record_date,
                total_amount = excluded.total_amount,
                remaining_amount = excluded.remaining_amount,
                spent_amount = excluded.spent_amount,
                upcoming_amount = excluded.upcoming_amount,
                from_previous = excluded.from_previous,
                expense_percent = excluded.expense_percent,
                total_income = excluded.total_income,
                daily_rate = excluded.daily_rate,
                updated_utc = excluded.updated_utc
            "#,
        )
        .bind(user_id)
        .bind(period.as_str())
        .bind(reference)
        .bind(overview.total_amount)
        .bind(overview.remaining_amount)
        .bind(overview.spent_amount)
        .bind(overview.upcoming_bills)
        .bind(overview.from_previous)
        .bind(overview.expense_percent)
        .bind(overview.total_income)
        .bind(overview.daily_rate)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to store budget record", e))?;

        tx.commit().await.map_err(|e| storage_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        OVERVIEWS_TOTAL
            .with_label_values(&[overview.period.as_str()])
            .inc();

        info!(
            start = %overview.start_date,
            end = %overview.end_date,
            total = overview.total_amount,
            remaining = overview.remaining_amount,
            "Budget overview calculated"
        );

        Ok(overview)
    }

    /// Fetch the stored budget record for (user, period).
    #[instrument(skip(self), fields(user_id = %user_id, period = %period))]
    pub async fn get_budget_record(
        &self,
        user_id: &str,
        period: &str,
    ) -> Result<Option<BudgetRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_budget_record"])
            .start_timer();

        let period = Period::parse(period)
            .ok_or_else(|| validation_error(format!("Unknown period '{}'", period)))?;

        let record = sqlx::query_as::<_, BudgetRecord>(
            r#"
            SELECT user_id, period, record_date, total_amount, remaining_amount,
                   spent_amount, upcoming_amount, from_previous, expense_percent,
                   total_income, daily_rate, updated_utc
            FROM budget_records
            WHERE user_id = ?1 AND period = ?2
            "#,
        )
        .bind(user_id)
        .bind(period.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to fetch budget record", e))?;

        timer.observe_duration();
        Ok(record)
    }
}

/// Build a counted `ValidationError`.
fn validation_error(msg: String) -> AppError {
    observe_error(AppError::ValidationError(anyhow::anyhow!(msg)))
}

/// Build a counted `StorageError` from a failed storage call.
fn storage_error(context: &str, e: impl std::fmt::Display) -> AppError {
    observe_error(AppError::StorageError(anyhow::anyhow!("{}: {}", context, e)))
}

/// Build a counted `NotFoundError`.
fn not_found(msg: String) -> AppError {
    observe_error(AppError::NotFoundError(anyhow::anyhow!(msg)))
}

/// Parse a `YYYY-MM-DD` event date.
fn parse_event_date(date: &str) -> Result<NaiveDate, AppError> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
        observe_error(AppError::DateFormatError(anyhow::anyhow!(
            "Invalid date '{}': {}",
            date,
            e
        )))
    })?;
    // %Y accepts wider years than the YYYY-MM-DD contract allows.
    if !(1..=9999).contains(&parsed.year()) {
        return Err(observe_error(AppError::DateFormatError(anyhow::anyhow!(
            "Date '{}' is out of range",
            date
        ))));
    }
    Ok(parsed)
}

fn parse_method(method: &str) -> Result<PaymentMethod, AppError> {
    PaymentMethod::parse(method).ok_or_else(|| {
        validation_error(format!(
            "Payment method must be 'cash' or 'bank', got '{}'",
            method
        ))
    })
}

/// Create the month row if this is the first event touching it.
async fn ensure_month_row(
    conn: &mut SqliteConnection,
    user_id: &str,
    year_month: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO monthly_cash_bank_balance (user_id, year_month)
        VALUES (?1, ?2)
        ON CONFLICT (user_id, year_month) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(year_month)
    .execute(&mut *conn)
    .await
    .map_err(|e| storage_error("Failed to create month row", e))?;
    Ok(())
}

/// Add `delta` (may be negative) to one month's income accumulator.
async fn bump_income(
    conn: &mut SqliteConnection,
    user_id: &str,
    year_month: &str,
    method: PaymentMethod,
    delta: f64,
) -> Result<(), AppError> {
    let sql = match method {
        PaymentMethod::Cash => {
            "UPDATE monthly_cash_bank_balance SET income_cash = income_cash + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
        PaymentMethod::Bank => {
            "UPDATE monthly_cash_bank_balance SET income_bank = income_bank + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
    };
    sqlx::query(sql)
        .bind(delta)
        .bind(user_id)
        .bind(year_month)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to update income accumulator", e))?;
    Ok(())
}

/// Add `delta` (may be negative) to one month's expense accumulator.
async fn bump_expense(
    conn: &mut SqliteConnection,
    user_id: &str,
    year_month: &str,
    method: PaymentMethod,
    delta: f64,
) -> Result<(), AppError> {
    let sql = match method {
        PaymentMethod::Cash => {
            "UPDATE monthly_cash_bank_balance SET expense_cash = expense_cash + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
        PaymentMethod::Bank => {
            "UPDATE monthly_cash_bank_balance SET expense_bank = expense_bank + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
    };
    sqlx::query(sql)
        .bind(delta)
        .bind(user_id)
        .bind(year_month)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to update expense accumulator", e))?;
    Ok(())
}

/// Add `delta` (may be negative) to one month's bill accumulator.
async fn bump_bill(
    conn: &mut SqliteConnection,
    user_id: &str,
    year_month: &str,
    method: PaymentMethod,
    delta: f64,
) -> Result<(), AppError> {
    let sql = match method {
        PaymentMethod::Cash => {
            "UPDATE monthly_cash_bank_balance SET bill_cash = bill_cash + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
        PaymentMethod::Bank => {
            "UPDATE monthly_cash_bank_balance SET bill_bank = bill_bank + ?1 \
             WHERE user_id = ?2 AND year_month = ?3"
        }
    };
    sqlx::query(sql)
        .bind(delta)
        .bind(user_id)
        .bind(year_month)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to update bill accumulator", e))?;
    Ok(())
}
