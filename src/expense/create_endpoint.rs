//! Defines the endpoint for creating a new expense.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;

use crate::{
    AppState, CategoryPolicy, Error,
    expense::{ExpenseForm, WriteOutcome, create_expense_idempotent, validate_expense},
};

/// The state needed to create an expense.
#[derive(Debug, Clone)]
pub struct CreateExpenseState {
    /// The database connection for managing expenses.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Which categories new expenses may use.
    pub category_policy: CategoryPolicy,
}

impl FromRef<AppState> for CreateExpenseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            category_policy: state.category_policy.clone(),
        }
    }
}

/// A route handler for creating a new expense.
///
/// Responds with 201 and the new expense, or with 200 and the existing
/// expense if one was already created with the same idempotency key. Invalid
/// fields are rejected with 422 before anything is written.
pub async fn create_expense_endpoint(
    State(state): State<CreateExpenseState>,
    WithRejection(Json(form), _): WithRejection<Json<ExpenseForm>, Error>,
) -> Result<Response, Error> {
    let new_expense =
        validate_expense(form, &state.category_policy).map_err(Error::Validation)?;

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let (expense, outcome) = create_expense_idempotent(new_expense, &connection)
        .inspect_err(|error| tracing::error!("could not create expense: {error}"))?;

    let status = match outcome {
        WriteOutcome::Created => StatusCode::CREATED,
        WriteOutcome::AlreadyExists => StatusCode::OK,
        WriteOutcome::ConflictRecovered => {
            tracing::info!(
                "Concurrent insert for idempotency key {:?} resolved to expense {}",
                expense.idempotency_key,
                expense.id
            );
            StatusCode::OK
        }
    };

    Ok((status, Json(expense)).into_response())
}
