//! Expense Tracker is a small service for recording personal expenses.
//!
//! This library provides a JSON REST API for creating expenses with
//! client-generated idempotency keys, listing them with a category filter and
//! date ordering, and listing the distinct categories in use. The [client]
//! module contains an HTTP client for the API with timeouts and retries, and
//! the state for an expense form and list view.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::{Deserialize, Serialize};
use tokio::signal;

mod app_state;
pub mod client;
mod config;
mod db;
mod endpoints;
pub mod expense;
mod internal_server_error;
mod logging;
mod not_found;
mod routing;

pub use app_state::AppState;
pub use config::{CategoryPolicy, ServerConfig};
pub use db::initialize as initialize_db;
pub use endpoints::{EXPENSE_CATEGORIES, EXPENSES, HEALTH};
pub use logging::{LOG_BODY_LENGTH_LIMIT, REQUEST_BODY_LIMIT, logging_middleware};
pub use routing::{build_router, cors_layer};

use crate::{
    expense::ValidationErrors, internal_server_error::internal_server_error_response,
    not_found::get_404_not_found_response,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The JSON body sent to the client for errors that are not field-level
/// validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// A short, client-safe description of what went wrong.
    pub error: String,
}

impl ErrorBody {
    /// Create an error body with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// One or more fields in the request failed validation.
    ///
    /// Validation errors are caught before anything reaches the database and
    /// are sent to the client with one message per failed field.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The request body or query string could not be parsed at all, e.g.
    /// malformed JSON or a field with the wrong JSON type.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// The status code chosen by the extractor that rejected the request.
        status: StatusCode,
        /// A description of the problem with the request.
        message: String,
    },

    /// The idempotency key already exists in the database.
    ///
    /// Each logical write attempt from a client carries an idempotency key
    /// and the database enforces uniqueness on it. This error is never shown
    /// to the client: the write path recovers from it by returning the
    /// expense that already holds the key.
    #[error("the idempotency key already exists in the database")]
    DuplicateIdempotencyKey,

    /// An insert was rejected because its idempotency key already exists,
    /// but no expense with that key could be found afterwards.
    #[error("no expense found for the conflicting idempotency key {0:?}")]
    UnresolvedIdempotencyConflict(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && desc.ends_with("expense.idempotency_key") =>
            {
                Error::DuplicateIdempotencyKey
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected JSON body: {}", rejection.body_text());

        // The rejection's own text quotes the parser error, so it is only logged.
        let message = match &rejection {
            JsonRejection::JsonDataError(_) => "Request body must be a JSON object",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => {
                "Request body must have content type application/json"
            }
            _ => "Could not read request body",
        };

        Error::InvalidRequest {
            status: rejection.status(),
            message: message.to_owned(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
            Error::InvalidRequest { status, message } => {
                (status, Json(ErrorBody::new(message))).into_response()
            }
            Error::NotFound => get_404_not_found_response(),
            // The client always sees a success for a duplicate key, so reaching
            // this point means a caller skipped the recovery step.
            error @ (Error::DuplicateIdempotencyKey
            | Error::UnresolvedIdempotencyConflict(_)
            | Error::DatabaseLockError
            | Error::SqlError(_)) => {
                tracing::error!("An unexpected error occurred: {}", error);
                internal_server_error_response()
            }
        }
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{
        Error,
        expense::{FieldError, ValidationErrors},
    };

    #[tokio::test]
    async fn validation_error_is_unprocessable_entity_with_field_errors() {
        let errors = ValidationErrors::from(vec![FieldError::new("amount", "Max 2 decimal places")]);

        let response = Error::Validation(errors).into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "errors": [{ "field": "amount", "message": "Max 2 decimal places" }]
            })
        );
    }

    #[tokio::test]
    async fn sql_error_does_not_leak_details() {
        let response = Error::SqlError(rusqlite::Error::InvalidQuery).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Internal server error" }));
    }

    #[test]
    fn unique_violation_on_idempotency_key_is_classified() {
        let error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            Some("UNIQUE constraint failed: expense.idempotency_key".to_owned()),
        );

        assert_eq!(Error::from(error), Error::DuplicateIdempotencyKey);
    }

    #[test]
    fn no_rows_is_not_found() {
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows),
            Error::NotFound
        );
    }
}
