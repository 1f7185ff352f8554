//! Application router configuration.

use std::any::Any;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE, header::InvalidHeaderValue},
    middleware,
    response::Response,
    routing::get,
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
};

use crate::{
    AppState,
    endpoints,
    expense::{create_expense_endpoint, get_categories_endpoint, list_expenses_endpoint},
    internal_server_error::internal_server_error_response,
    logging::logging_middleware,
    not_found::get_404_not_found,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(
            endpoints::EXPENSES,
            get(list_expenses_endpoint).post(create_expense_endpoint),
        )
        .route(endpoints::EXPENSE_CATEGORIES, get(get_categories_endpoint))
        .fallback(get_404_not_found)
        .method_not_allowed_fallback(get_404_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Create the layer that lets browsers on `allowed_origin` call the API.
///
/// Any origin is allowed if `allowed_origin` is `None`. Only GET and POST
/// requests are allowed.
///
/// # Errors
/// Returns an error if `allowed_origin` is not a valid header value.
pub fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    match allowed_origin {
        Some(origin) => Ok(layer.allow_origin(origin.parse::<HeaderValue>()?)),
        None => Ok(layer.allow_origin(AnyOrigin)),
    }
}

/// The liveness probe.
async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn handle_panic(error: Box<dyn Any + Send + 'static>) -> Response {
    let message = error
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| error.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    tracing::error!("A request handler panicked: {message}");

    internal_server_error_response()
}
