//! Domain models for cashbook-service.

mod balance;
mod bill;
mod budget;
mod month;
mod transaction;

pub use balance::MonthlyBalance;
pub use bill::{Bill, BillPayment, BillWithStatus, NewBill, UpdateBill};
pub use budget::{BudgetOverview, BudgetRecord, Direction, Period};
pub use month::MonthKey;
pub use transaction::{
    Expense, Income, NewExpense, NewIncome, PaymentMethod, UpdateExpense, UpdateIncome,
};
