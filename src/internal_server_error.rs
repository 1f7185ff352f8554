//! The response to send when an internal server error occurs.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::ErrorBody;

/// The message shown to clients for any unexpected server-side failure.
///
/// Details of the failure are only ever written to the server logs.
pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error";

/// Get a 500 response with a generic JSON error body.
pub fn internal_server_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(INTERNAL_SERVER_ERROR_MESSAGE)),
    )
        .into_response()
}
