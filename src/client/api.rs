//! The HTTP client for the expense API.

use reqwest::{Response, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    ErrorBody, EXPENSE_CATEGORIES, EXPENSES,
    client::{ClientError, ExpenseFilters, REQUEST_FAILED_MESSAGE, RetryPolicy, with_retry},
    expense::{Expense, ValidationErrors},
};

/// The JSON body for creating an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    /// Identifies this entry so that retries do not create duplicates.
    pub idempotency_key: String,
    /// The amount as a decimal string, e.g. "25.50".
    pub amount: String,
    /// The category label.
    pub category: String,
    /// What the expense was for.
    pub description: String,
    /// The date of the expense, e.g. "2024-01-15".
    pub date: String,
}

/// The result of a successful create request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedExpense {
    /// The expense saved for the request's idempotency key.
    pub expense: Expense,
    /// `true` if this request created the expense, `false` if an earlier
    /// request with the same idempotency key already had.
    pub created: bool,
}

/// Makes requests to the expense API.
///
/// Every request is made with the client's [RetryPolicy].
#[derive(Debug, Clone)]
pub struct ExpenseClient {
    base_url: Url,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl ExpenseClient {
    /// Create a client for the API at `base_url`, e.g. "http://localhost:5000".
    ///
    /// # Errors
    /// Returns [ClientError::InvalidBaseUrl] if `base_url` cannot be parsed.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(base_url).map_err(|_| ClientError::InvalidBaseUrl(base_url.to_owned()))?;

        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }

        // Make sure joining paths appends to the base path instead of replacing
        // its last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Use `retry_policy` instead of the default policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The policy used for every request.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Create an expense, or get the one already created with the same
    /// idempotency key.
    ///
    /// # Errors
    /// Returns [ClientError::Api] with the field errors if the server rejected
    /// the expense, or another [ClientError] once all retries have failed.
    pub async fn create_expense(
        &self,
        request: &CreateExpenseRequest,
    ) -> Result<CreatedExpense, ClientError> {
        let url = &self.endpoint(EXPENSES)?;
        let http = &self.http;

        with_retry(&self.retry_policy, || async move {
            let response = http.post(url.clone()).json(request).send().await?;
            let created = response.status() == StatusCode::CREATED;
            let expense = decode::<Expense>(response).await?;

            Ok(CreatedExpense { expense, created })
        })
        .await
    }

    /// List the expenses matching `filters`.
    ///
    /// # Errors
    /// Returns a [ClientError] once all retries have failed.
    pub async fn list_expenses(&self, filters: &ExpenseFilters) -> Result<Vec<Expense>, ClientError> {
        let mut url = self.endpoint(EXPENSES)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(category) = filters.category.as_deref() {
                query.append_pair("category", category);
            }
            query.append_pair("sort", filters.sort.as_str());
        }

        let url = &url;
        let http = &self.http;

        with_retry(&self.retry_policy, || async move {
            let response = http.get(url.clone()).send().await?;
            decode(response).await
        })
        .await
    }

    /// Get the categories used by existing expenses.
    ///
    /// # Errors
    /// Returns a [ClientError] once all retries have failed.
    pub async fn get_categories(&self) -> Result<Vec<String>, ClientError> {
        let url = &self.endpoint(EXPENSE_CATEGORIES)?;
        let http = &self.http;

        with_retry(&self.retry_policy, || async move {
            let response = http.get(url.clone()).send().await?;
            decode(response).await
        })
        .await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.to_string()))
    }
}

/// Read the body of `response` as `T`, or turn an error status into a
/// [ClientError].
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        return serde_json::from_slice(&bytes)
            .map_err(|error| ClientError::InvalidResponse(error.to_string()));
    }

    if status.is_client_error() {
        let bytes = response.bytes().await.unwrap_or_default();
        return Err(client_error(status, &bytes));
    }

    Err(ClientError::Server(status))
}

fn client_error(status: StatusCode, body: &[u8]) -> ClientError {
    if let Ok(errors) = serde_json::from_slice::<ValidationErrors>(body) {
        return ClientError::Api {
            status,
            message: errors.to_string(),
            field_errors: errors.errors,
        };
    }

    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|body| body.error)
        .unwrap_or_else(|_| REQUEST_FAILED_MESSAGE.to_owned());

    ClientError::Api {
        status,
        message,
        field_errors: vec![],
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use axum::{Json, Router, http::StatusCode, routing::get};
    use rusqlite::Connection;
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::{
        AppState, CategoryPolicy, build_router,
        client::{ClientError, ExpenseClient, ExpenseFilters, RetryPolicy},
        expense::SortOrder,
    };

    use super::{CreateExpenseRequest, client_error};

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn serve_app() -> ExpenseClient {
        let conn = Connection::open_in_memory().unwrap();
        let state = AppState::new(conn, CategoryPolicy::FreeText).unwrap();
        let addr = serve(build_router(state)).await;

        ExpenseClient::new(&format!("http://{addr}"))
            .unwrap()
            .with_retry_policy(fast_policy())
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn lunch(key: &str, date: &str) -> CreateExpenseRequest {
        CreateExpenseRequest {
            idempotency_key: key.to_owned(),
            amount: "25.50".to_owned(),
            category: "Food".to_owned(),
            description: "Lunch".to_owned(),
            date: date.to_owned(),
        }
    }

    #[test]
    fn base_url_path_is_kept() {
        let client = ExpenseClient::new("http://localhost:5000/api").unwrap();

        assert_eq!(
            client.endpoint("/expenses").unwrap().as_str(),
            "http://localhost:5000/api/expenses"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            ExpenseClient::new("not a url"),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn field_errors_are_read_from_body() {
        let body = json!({ "errors": [{ "field": "amount", "message": "Max 2 decimal places" }] });

        let error = client_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            body.to_string().as_bytes(),
        );

        match error {
            ClientError::Api {
                message,
                field_errors,
                ..
            } => {
                assert_eq!(message, "Max 2 decimal places");
                assert_eq!(field_errors.len(), 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_then_replay() {
        let client = serve_app().await;

        let first = client
            .create_expense(&lunch("k1", "2024-01-15"))
            .await
            .unwrap();
        let second = client
            .create_expense(&lunch("k1", "2024-01-15"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.expense, second.expense);
        assert_eq!(first.expense.amount.to_string(), "25.50");
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let client = serve_app().await;
        let mut request = lunch("k1", "2024-01-15");
        request.amount = "10.999".to_owned();

        let error = client.create_expense(&request).await.unwrap_err();

        match error {
            ClientError::Api {
                status,
                field_errors,
                ..
            } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(field_errors[0].field, "amount");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_with_filters_and_categories() {
        let client = serve_app().await;
        client
            .create_expense(&lunch("a", "2024-01-20"))
            .await
            .unwrap();
        client
            .create_expense(&lunch("b", "2024-01-10"))
            .await
            .unwrap();

        let expenses = client
            .list_expenses(&ExpenseFilters {
                category: Some("food".to_owned()),
                sort: SortOrder::DateAsc,
            })
            .await
            .unwrap();
        let categories = client.get_categories().await.unwrap();

        let keys: Vec<&str> = expenses.iter().map(|e| e.idempotency_key.as_str()).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(categories, ["Food"]);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let app = Router::new().route(
            "/expenses/categories",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(vec!["Food".to_owned()]))
                    }
                }
            }),
        );
        let addr = serve(app).await;
        let client = ExpenseClient::new(&format!("http://{addr}"))
            .unwrap()
            .with_retry_policy(fast_policy());

        let categories = client.get_categories().await.unwrap();

        assert_eq!(categories, ["Food"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_sent_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let app = Router::new().route(
            "/expenses/categories",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, Json(json!({ "error": "Bad request" })))
                }
            }),
        );
        let addr = serve(app).await;
        let client = ExpenseClient::new(&format!("http://{addr}"))
            .unwrap()
            .with_retry_policy(fast_policy());

        let error = client.get_categories().await.unwrap_err();

        assert_eq!(error.user_message(), "Bad request");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_with_server_error() {
        let app = Router::new().route(
            "/expenses/categories",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let addr = serve(app).await;
        let client = ExpenseClient::new(&format!("http://{addr}"))
            .unwrap()
            .with_retry_policy(fast_policy());

        let error = client.get_categories().await.unwrap_err();

        assert!(matches!(
            error,
            ClientError::Server(StatusCode::INTERNAL_SERVER_ERROR)
        ));
    }
}
