//! Defines the core data models and database queries for expenses.

use std::{fmt, str::FromStr};

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Error, expense::Amount};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the integer type used for expense IDs.
pub type ExpenseId = i64;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Money spent on something, recorded once and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// The ID of the expense, assigned by the database.
    pub id: ExpenseId,
    /// The client-generated key of the write attempt that created this expense.
    pub idempotency_key: String,
    /// How much was spent.
    pub amount: Amount,
    /// A free text label, e.g. "Food".
    pub category: String,
    /// What the money was spent on.
    pub description: String,
    /// The day the money was spent.
    #[serde(with = "iso_date")]
    pub date: Date,
    /// When the expense was inserted into the database.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A validated expense that has not been saved yet.
///
/// Create one with [crate::expense::validate_expense].
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub(crate) idempotency_key: String,
    pub(crate) amount: Amount,
    pub(crate) category: String,
    pub(crate) description: String,
    pub(crate) date: Date,
}

impl NewExpense {
    /// The client-generated key identifying this write attempt.
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

/// How a request to create an expense was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No expense had the idempotency key, so a new one was inserted.
    Created,
    /// An expense with the idempotency key already existed and was returned
    /// unchanged.
    AlreadyExists,
    /// The insert lost a race against a concurrent request with the same
    /// idempotency key, and the winner's expense was returned.
    ConflictRecovered,
}

/// The order to list expenses in.
///
/// Expenses are ordered by date, then by insertion time, both in the same
/// direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
}

impl SortOrder {
    /// The name of the order as used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::DateDesc => "date_desc",
            SortOrder::DateAsc => "date_asc",
        }
    }

    fn sql_direction(&self) -> &'static str {
        match self {
            SortOrder::DateDesc => "DESC",
            SortOrder::DateAsc => "ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown [SortOrder].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Sort must be one of: date_desc, date_asc")]
pub struct InvalidSortOrder;

impl FromStr for SortOrder {
    type Err = InvalidSortOrder;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "date_desc" => Ok(SortOrder::DateDesc),
            "date_asc" => Ok(SortOrder::DateAsc),
            _ => Err(InvalidSortOrder),
        }
    }
}

/// Which expenses to list and in what order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseQuery {
    /// Only list expenses with this category, compared case-insensitively.
    pub category: Option<String>,
    /// The order to list expenses in.
    pub sort: SortOrder,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Save `new_expense` unless an expense with the same idempotency key exists.
///
/// Calling this any number of times with the same idempotency key results in
/// exactly one expense in the database. Every call returns that expense.
///
/// # Errors
/// This function will return a:
/// - [Error::UnresolvedIdempotencyConflict] if the insert failed on the
///   idempotency key but the expense holding the key could not be found,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_expense_idempotent(
    new_expense: NewExpense,
    connection: &Connection,
) -> Result<(Expense, WriteOutcome), Error> {
    if let Some(existing) = get_expense_by_idempotency_key(&new_expense.idempotency_key, connection)?
    {
        return Ok((existing, WriteOutcome::AlreadyExists));
    }

    match insert_expense(&new_expense, OffsetDateTime::now_utc(), connection) {
        Ok(expense) => Ok((expense, WriteOutcome::Created)),
        Err(Error::DuplicateIdempotencyKey) => {
            let expense = recover_conflicting_insert(&new_expense.idempotency_key, connection)?;
            Ok((expense, WriteOutcome::ConflictRecovered))
        }
        Err(error) => Err(error),
    }
}

/// Insert a new expense into the database.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateIdempotencyKey] if an expense with the same idempotency
///   key already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_expense(
    new_expense: &NewExpense,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Expense, Error> {
    let expense = connection
        .prepare(
            "INSERT INTO expense
                (idempotency_key, amount, category, category_folded, description, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id, idempotency_key, amount, category, description, date, created_at",
        )?
        .query_row(
            (
                &new_expense.idempotency_key,
                new_expense.amount,
                &new_expense.category,
                fold_category(&new_expense.category),
                &new_expense.description,
                new_expense.date,
                created_at,
            ),
            map_expense_row,
        )?;

    Ok(expense)
}

/// Get the expense that won an insert race on `idempotency_key`.
///
/// # Errors
/// This function will return a:
/// - [Error::UnresolvedIdempotencyConflict] if no expense has the key,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn recover_conflicting_insert(
    idempotency_key: &str,
    connection: &Connection,
) -> Result<Expense, Error> {
    tracing::debug!("Recovering from a concurrent insert with idempotency key {idempotency_key:?}");

    get_expense_by_idempotency_key(idempotency_key, connection)?
        .ok_or_else(|| Error::UnresolvedIdempotencyConflict(idempotency_key.to_owned()))
}

/// Retrieve the expense created with `idempotency_key`, if there is one.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_expense_by_idempotency_key(
    idempotency_key: &str,
    connection: &Connection,
) -> Result<Option<Expense>, Error> {
    let expense = connection
        .prepare(
            "SELECT id, idempotency_key, amount, category, description, date, created_at
             FROM expense WHERE idempotency_key = :idempotency_key",
        )?
        .query_row(&[(":idempotency_key", &idempotency_key)], map_expense_row)
        .optional()?;

    Ok(expense)
}

/// List the expenses matching `query`.
///
/// The category filter is an exact, case-insensitive match, so "food" matches
/// "Food" but not "Food2". The category is compared as a bound parameter and
/// never interpreted as a pattern.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn list_expenses(query: &ExpenseQuery, connection: &Connection) -> Result<Vec<Expense>, Error> {
    let direction = query.sort.sql_direction();
    let order_by = format!("ORDER BY date {direction}, created_at {direction}, id {direction}");

    match &query.category {
        Some(category) => connection
            .prepare(&format!(
                "SELECT id, idempotency_key, amount, category, description, date, created_at
                 FROM expense WHERE category_folded = :category {order_by}"
            ))?
            .query_map(&[(":category", &fold_category(category))], map_expense_row)?
            .map(|maybe_expense| maybe_expense.map_err(|error| error.into()))
            .collect(),
        None => connection
            .prepare(&format!(
                "SELECT id, idempotency_key, amount, category, description, date, created_at
                 FROM expense {order_by}"
            ))?
            .query_map([], map_expense_row)?
            .map(|maybe_expense| maybe_expense.map_err(|error| error.into()))
            .collect(),
    }
}

/// Get the distinct categories of all expenses, sorted alphabetically.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn get_categories(connection: &Connection) -> Result<Vec<String>, Error> {
    connection
        .prepare("SELECT DISTINCT category FROM expense ORDER BY category ASC")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of expenses in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_expenses(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM expense;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the expense table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS expense (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_key TEXT NOT NULL UNIQUE,
            amount TEXT NOT NULL,
            category TEXT NOT NULL,
            category_folded TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_expense_date ON expense(date, created_at);
        CREATE INDEX IF NOT EXISTS idx_expense_category_date
            ON expense(category_folded, date, created_at);",
    )?;

    Ok(())
}

/// Map a database row to an Expense.
pub fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    let id = row.get(0)?;
    let idempotency_key = row.get(1)?;
    let amount = row.get(2)?;
    let category = row.get(3)?;
    let description = row.get(4)?;
    let date = row.get(5)?;
    let created_at = row.get(6)?;

    Ok(Expense {
        id,
        idempotency_key,
        amount,
        category,
        description,
        date,
        created_at,
    })
}

fn fold_category(category: &str) -> String {
    category.trim().to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================
