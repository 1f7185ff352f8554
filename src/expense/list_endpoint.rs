//! Defines the endpoint for listing expenses.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Query, State},
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    expense::{Expense, ExpenseQuery, SortOrder, ValidationErrors, list_expenses},
};

/// The state needed to list expenses.
#[derive(Debug, Clone)]
pub struct ListExpensesState {
    /// The database connection for reading expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListExpensesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The query string for listing expenses.
#[derive(Debug, Default, Deserialize)]
pub struct ListExpensesQuery {
    /// Only list expenses in this category. Blank means all categories.
    pub category: Option<String>,
    /// Either "date_desc" (the default) or "date_asc".
    pub sort: Option<String>,
}

impl TryFrom<ListExpensesQuery> for ExpenseQuery {
    type Error = ValidationErrors;

    fn try_from(query: ListExpensesQuery) -> Result<Self, Self::Error> {
        let category = query
            .category
            .map(|category| category.trim().to_owned())
            .filter(|category| !category.is_empty());

        let sort = match query.sort.as_deref().map(str::trim) {
            None | Some("") => SortOrder::default(),
            Some(sort) => sort.parse::<SortOrder>().map_err(|error| {
                let mut errors = ValidationErrors::default();
                errors.add("sort", &error.to_string());
                errors
            })?,
        };

        Ok(ExpenseQuery { category, sort })
    }
}

/// A route handler for listing expenses, optionally filtered by category.
///
/// Expenses are sorted by date and then by when they were created, newest
/// first unless `sort=date_asc` is given.
pub async fn list_expenses_endpoint(
    State(state): State<ListExpensesState>,
    WithRejection(Query(query), _): WithRejection<Query<ListExpensesQuery>, Error>,
) -> Result<Json<Vec<Expense>>, Error> {
    let query = ExpenseQuery::try_from(query).map_err(Error::Validation)?;

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let expenses = list_expenses(&query, &connection)
        .inspect_err(|error| tracing::error!("could not list expenses: {error}"))?;

    Ok(Json(expenses))
}
