//! A client for the expense API.
//!
//! - [ExpenseClient] makes requests with a timeout and retries failed requests
//!   that are not client errors.
//! - [ExpenseFormState] holds a form for a new expense, checks it before
//!   submitting and keeps the idempotency key for the current entry.
//! - [ExpenseListView] holds the filtered list of expenses and their total.

mod api;
mod form;
mod list;
mod retry;

use std::time::Duration;

use reqwest::StatusCode;

pub use api::{CreateExpenseRequest, CreatedExpense, ExpenseClient};
pub use form::{
    ExpenseDraft, ExpenseFormState, FormField, FormStatus, SUCCESS_RESET_DELAY,
    SUGGESTED_CATEGORIES, today,
};
pub use list::{ExpenseFilters, ExpenseListView, sum_amounts};
pub use retry::{RetryPolicy, with_retry};

use crate::expense::FieldError;

/// The message shown to users when a request fails without a more specific
/// reason.
pub const REQUEST_FAILED_MESSAGE: &str = "Request failed. Try again.";
/// The message shown to users when the server fails to handle a request.
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Try again later.";

/// The errors that may occur when calling the expense API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the request as a client error (4xx).
    ///
    /// Sending the same request again would fail the same way, so these are
    /// never retried.
    #[error("request rejected with {status}: {message}")]
    Api {
        /// The response status.
        status: StatusCode,
        /// The error message from the server.
        message: String,
        /// Per-field validation messages, if the server sent any.
        field_errors: Vec<FieldError>,
    },

    /// The server failed to handle the request (5xx).
    #[error("server error {0}")]
    Server(StatusCode),

    /// No response arrived within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the response could not be read.
    #[error("could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response was not what the API promises.
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),

    /// The URL of the API is not valid.
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}

impl ClientError {
    /// Whether sending the same request again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { .. } | ClientError::InvalidBaseUrl(_) => false,
            ClientError::Server(_)
            | ClientError::Timeout(_)
            | ClientError::Transport(_)
            | ClientError::InvalidResponse(_) => true,
        }
    }

    /// A message that is safe to show to users.
    ///
    /// Only messages written for users by the API are passed through; any
    /// other failure is reduced to a generic message.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Server(_) => SERVER_ERROR_MESSAGE.to_owned(),
            ClientError::Timeout(_)
            | ClientError::Transport(_)
            | ClientError::InvalidResponse(_)
            | ClientError::InvalidBaseUrl(_) => REQUEST_FAILED_MESSAGE.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use crate::expense::FieldError;

    use super::{ClientError, REQUEST_FAILED_MESSAGE, SERVER_ERROR_MESSAGE};

    #[test]
    fn client_errors_are_not_retryable() {
        let error = ClientError::Api {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Max 2 decimal places".to_owned(),
            field_errors: vec![FieldError::new("amount", "Max 2 decimal places")],
        };

        assert!(!error.is_retryable());
        assert_eq!(error.user_message(), "Max 2 decimal places");
    }

    #[test]
    fn server_errors_are_retryable_and_generic() {
        let error = ClientError::Server(StatusCode::INTERNAL_SERVER_ERROR);

        assert!(error.is_retryable());
        assert_eq!(error.user_message(), SERVER_ERROR_MESSAGE);
    }

    #[test]
    fn timeouts_are_retryable_and_generic() {
        let error = ClientError::Timeout(Duration::from_secs(10));

        assert!(error.is_retryable());
        assert_eq!(error.user_message(), REQUEST_FAILED_MESSAGE);
    }
}
