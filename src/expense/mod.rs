//! Expenses: validating, saving with idempotency keys, and listing them.

mod amount;
mod categories_endpoint;
mod core;
mod create_endpoint;
mod list_endpoint;
mod validation;

pub use amount::{Amount, AmountError, MAX_DECIMAL_PLACES};
pub use categories_endpoint::get_categories_endpoint;
pub use core::{
    Expense, ExpenseId, ExpenseQuery, InvalidSortOrder, NewExpense, SortOrder, WriteOutcome,
    count_expenses, create_expense_idempotent, create_expense_table, get_categories,
    get_expense_by_idempotency_key, insert_expense, list_expenses, map_expense_row,
    recover_conflicting_insert,
};
pub use create_endpoint::{CreateExpenseState, create_expense_endpoint};
pub use list_endpoint::{ListExpensesQuery, ListExpensesState, list_expenses_endpoint};
pub use validation::{
    ExpenseForm, FieldError, MAX_CATEGORY_LENGTH, MAX_DESCRIPTION_LENGTH, ValidationErrors,
    character_count, parse_expense_date, validate_expense,
};
