//! Defines the endpoint for listing the categories in use.
use axum::{Json, extract::State};

use crate::{
    Error,
    expense::{ListExpensesState, get_categories},
};

/// A route handler for the distinct categories of all expenses, sorted
/// alphabetically.
pub async fn get_categories_endpoint(
    State(state): State<ListExpensesState>,
) -> Result<Json<Vec<String>>, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let categories = get_categories(&connection)
        .inspect_err(|error| tracing::error!("could not get categories: {error}"))?;

    Ok(Json(categories))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        db::initialize,
        expense::{
            ListExpensesState, NewExpense, create_expense_idempotent, get_categories_endpoint,
        },
    };

    #[tokio::test]
    async fn returns_sorted_distinct_categories() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        for (key, category) in [("1", "Shopping"), ("2", "Food"), ("3", "Shopping")] {
            let new_expense = NewExpense {
                idempotency_key: key.to_owned(),
                amount: "1".parse().unwrap(),
                category: category.to_owned(),
                description: "Thing".to_owned(),
                date: date!(2024 - 03 - 01),
            };
            create_expense_idempotent(new_expense, &conn).unwrap();
        }
        let state = ListExpensesState {
            db_connection: Arc::new(Mutex::new(conn)),
        };
        let app = Router::new()
            .route("/expenses/categories", get(get_categories_endpoint))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server.get("/expenses/categories").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Vec<String>>(), ["Food", "Shopping"]);
    }
}
