//! The state of the form for recording a new expense.

use std::time::{Duration, Instant};

use time::{Date, OffsetDateTime, macros::format_description};
use uuid::Uuid;

use crate::{
    client::{ClientError, CreateExpenseRequest, CreatedExpense, ExpenseClient},
    expense::{Amount, AmountError, ValidationErrors, parse_expense_date},
};

/// How long the form shows that an expense was saved before going back to
/// [FormStatus::Idle].
pub const SUCCESS_RESET_DELAY: Duration = Duration::from_secs(2);

/// The categories offered when entering an expense.
///
/// The server accepts any category unless it is configured with a list of
/// allowed categories.
pub const SUGGESTED_CATEGORIES: [&str; 8] = [
    "Food",
    "Transport",
    "Housing",
    "Healthcare",
    "Entertainment",
    "Shopping",
    "Utilities",
    "Other",
];

/// Where the form is in the submission process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormStatus {
    /// Waiting for input.
    Idle,
    /// A request to save the expense is in flight.
    Submitting,
    /// The expense was saved at `since`.
    Success {
        /// When the expense was saved.
        since: Instant,
    },
    /// The last submission failed with a message for the user.
    Error(String),
}

/// The text entered into the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    /// The amount as typed, e.g. "25.50".
    pub amount: String,
    /// The category label.
    pub category: String,
    /// What the expense was for.
    pub description: String,
    /// The date as typed, e.g. "2024-01-15".
    pub date: String,
}

impl ExpenseDraft {
    /// An empty draft dated `today`.
    pub fn new(today: Date) -> Self {
        Self {
            amount: String::new(),
            category: String::new(),
            description: String::new(),
            date: format_date(today),
        }
    }
}

/// The inputs of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// The amount input.
    Amount,
    /// The category input.
    Category,
    /// The description input.
    Description,
    /// The date input.
    Date,
}

impl FormField {
    /// The name the API uses for this field in validation errors.
    pub fn name(&self) -> &'static str {
        match self {
            FormField::Amount => "amount",
            FormField::Category => "category",
            FormField::Description => "description",
            FormField::Date => "date",
        }
    }
}

/// The form for recording a new expense.
///
/// The form keeps one idempotency key per entry. The key is reused when a
/// failed submission is tried again, so the server saves the entry at most
/// once, and replaced after a successful submission so that the next entry is
/// saved as a new expense.
#[derive(Debug, Clone)]
pub struct ExpenseFormState {
    draft: ExpenseDraft,
    errors: ValidationErrors,
    status: FormStatus,
    idempotency_key: String,
}

impl ExpenseFormState {
    /// An empty form dated `today` with a fresh idempotency key.
    pub fn new(today: Date) -> Self {
        Self {
            draft: ExpenseDraft::new(today),
            errors: ValidationErrors::default(),
            status: FormStatus::Idle,
            idempotency_key: generate_key(),
        }
    }

    /// The text entered so far.
    pub fn draft(&self) -> &ExpenseDraft {
        &self.draft
    }

    /// The problems found with the entered text.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Where the form is in the submission process.
    pub fn status(&self) -> &FormStatus {
        &self.status
    }

    /// The key that will be sent with the next submission.
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    /// Use `key` for the current entry instead of the generated one, e.g. to
    /// resume an entry whose outcome is unknown.
    pub fn set_idempotency_key(&mut self, key: impl Into<String>) {
        self.idempotency_key = key.into();
    }

    /// Change the text of `field` and clear its error.
    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();

        match field {
            FormField::Amount => self.draft.amount = value,
            FormField::Category => self.draft.category = value,
            FormField::Description => self.draft.description = value,
            FormField::Date => self.draft.date = value,
        }

        self.errors.remove(field.name());
    }

    /// Check the entered text.
    ///
    /// These checks only give quick feedback. The server checks every request
    /// again.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let draft = &self.draft;

        match draft.amount.parse::<Amount>() {
            Ok(_) => {}
            Err(AmountError::NotANumber | AmountError::NotPositive) => {
                errors.add(FormField::Amount.name(), "Enter a positive amount");
            }
            Err(AmountError::TooManyDecimalPlaces) => {
                errors.add(FormField::Amount.name(), "Max 2 decimal places");
            }
            Err(AmountError::TooLarge) => {
                errors.add(FormField::Amount.name(), "Amount is too large");
            }
        }

        if draft.category.trim().is_empty() {
            errors.add(FormField::Category.name(), "Select a category");
        }

        if draft.description.trim().is_empty() {
            errors.add(FormField::Description.name(), "Description is required");
        }

        if draft.date.trim().is_empty() {
            errors.add(FormField::Date.name(), "Date is required");
        } else if parse_expense_date(&draft.date).is_none() {
            errors.add(FormField::Date.name(), "Valid date required");
        }

        errors
    }

    /// Start submitting the form.
    ///
    /// Returns the request to send, or `None` if the entered text is invalid
    /// or a submission is already in flight.
    pub fn begin_submit(&mut self) -> Option<CreateExpenseRequest> {
        if self.status == FormStatus::Submitting {
            return None;
        }

        self.errors = self.validate();
        if !self.errors.is_empty() {
            return None;
        }

        self.status = FormStatus::Submitting;

        Some(CreateExpenseRequest {
            idempotency_key: self.idempotency_key.clone(),
            amount: self.draft.amount.trim().to_owned(),
            category: self.draft.category.trim().to_owned(),
            description: self.draft.description.trim().to_owned(),
            date: self.draft.date.trim().to_owned(),
        })
    }

    /// Record that the expense was saved at `now`.
    ///
    /// Clears the form, dated `today`, and generates a new idempotency key for
    /// the next entry.
    pub fn submission_succeeded(&mut self, now: Instant, today: Date) {
        self.draft = ExpenseDraft::new(today);
        self.errors = ValidationErrors::default();
        self.idempotency_key = generate_key();
        self.status = FormStatus::Success { since: now };
    }

    /// Record that the expense could not be saved.
    ///
    /// The entered text and the idempotency key are kept so the entry can be
    /// submitted again without creating a duplicate.
    pub fn submission_failed(&mut self, error: &ClientError) {
        if let ClientError::Api { field_errors, .. } = error {
            for field_error in field_errors {
                self.errors.add(&field_error.field, &field_error.message);
            }
        }

        self.status = FormStatus::Error(error.user_message());
    }

    /// Go back to [FormStatus::Idle] once a success has been shown for
    /// [SUCCESS_RESET_DELAY].
    pub fn tick(&mut self, now: Instant) {
        if let FormStatus::Success { since } = self.status {
            if now.saturating_duration_since(since) >= SUCCESS_RESET_DELAY {
                self.status = FormStatus::Idle;
            }
        }
    }

    /// Validate the form and send it with `client`.
    ///
    /// Returns the saved expense, or `None` if the form was not sent or the
    /// request failed. Check [ExpenseFormState::status] and
    /// [ExpenseFormState::errors] for the reason.
    pub async fn submit(&mut self, client: &ExpenseClient) -> Option<CreatedExpense> {
        let request = self.begin_submit()?;

        match client.create_expense(&request).await {
            Ok(created) => {
                self.submission_succeeded(Instant::now(), today());
                Some(created)
            }
            Err(error) => {
                tracing::warn!("Could not save expense: {error}");
                self.submission_failed(&error);
                None
            }
        }
    }
}

/// The current date in the local time zone, or in UTC if the local offset
/// cannot be determined.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

fn generate_key() -> String {
    Uuid::new_v4().to_string()
}

fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use reqwest::StatusCode;
    use rusqlite::Connection;
    use time::macros::date;
    use tokio::net::TcpListener;

    use crate::{
        AppState, CategoryPolicy, build_router,
        client::{ClientError, ExpenseClient, RetryPolicy, SERVER_ERROR_MESSAGE},
        expense::FieldError,
    };

    use super::{ExpenseFormState, FormField, FormStatus, SUCCESS_RESET_DELAY};

    fn filled_form() -> ExpenseFormState {
        let mut form = ExpenseFormState::new(date!(2024 - 01 - 15));
        form.set_field(FormField::Amount, "25.50");
        form.set_field(FormField::Category, "Food");
        form.set_field(FormField::Description, "Lunch");
        form
    }

    async fn serve_client(category_policy: CategoryPolicy) -> ExpenseClient {
        let conn = Connection::open_in_memory().unwrap();
        let state = AppState::new(conn, category_policy).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        ExpenseClient::new(&format!("http://{addr}"))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                backoff: Duration::from_millis(1),
                ..RetryPolicy::default()
            })
    }

    #[test]
    fn new_form_is_dated_today_with_key() {
        let form = ExpenseFormState::new(date!(2024 - 01 - 15));

        assert_eq!(form.draft().date, "2024-01-15");
        assert_eq!(form.draft().amount, "");
        assert_eq!(form.status(), &FormStatus::Idle);
        assert!(!form.idempotency_key().is_empty());
    }

    #[test]
    fn empty_form_reports_required_fields() {
        let mut form = ExpenseFormState::new(date!(2024 - 01 - 15));
        form.set_field(FormField::Date, "");

        let errors = form.validate();

        assert_eq!(errors.message_for("amount"), Some("Enter a positive amount"));
        assert_eq!(errors.message_for("category"), Some("Select a category"));
        assert_eq!(
            errors.message_for("description"),
            Some("Description is required")
        );
        assert_eq!(errors.message_for("date"), Some("Date is required"));
    }

    #[test]
    fn amount_format_is_checked() {
        let mut form = filled_form();

        form.set_field(FormField::Amount, "10.999");
        assert_eq!(
            form.validate().message_for("amount"),
            Some("Max 2 decimal places")
        );

        form.set_field(FormField::Amount, "-5");
        assert_eq!(
            form.validate().message_for("amount"),
            Some("Enter a positive amount")
        );

        form.set_field(FormField::Amount, "abc");
        assert_eq!(
            form.validate().message_for("amount"),
            Some("Enter a positive amount")
        );
    }

    #[test]
    fn invalid_date_is_reported() {
        let mut form = filled_form();
        form.set_field(FormField::Date, "2024-02-30");

        assert_eq!(form.validate().message_for("date"), Some("Valid date required"));
    }

    #[test]
    fn invalid_form_is_not_submitted() {
        let mut form = filled_form();
        form.set_field(FormField::Amount, "");

        assert_eq!(form.begin_submit(), None);
        assert_eq!(form.status(), &FormStatus::Idle);
        assert_eq!(
            form.errors().message_for("amount"),
            Some("Enter a positive amount")
        );
    }

    #[test]
    fn editing_a_field_clears_its_error() {
        let mut form = filled_form();
        form.set_field(FormField::Amount, "");
        form.begin_submit();

        form.set_field(FormField::Amount, "3");

        assert_eq!(form.errors().message_for("amount"), None);
    }

    #[test]
    fn submit_sends_trimmed_text_with_key() {
        let mut form = filled_form();
        form.set_field(FormField::Description, "  Lunch  ");
        let key = form.idempotency_key().to_owned();

        let request = form.begin_submit().unwrap();

        assert_eq!(request.idempotency_key, key);
        assert_eq!(request.amount, "25.50");
        assert_eq!(request.description, "Lunch");
        assert_eq!(request.date, "2024-01-15");
        assert_eq!(form.status(), &FormStatus::Submitting);
    }

    #[test]
    fn cannot_submit_twice_at_once() {
        let mut form = filled_form();

        assert!(form.begin_submit().is_some());
        assert!(form.begin_submit().is_none());
    }

    #[test]
    fn success_clears_form_and_replaces_key() {
        let mut form = filled_form();
        let key = form.idempotency_key().to_owned();
        form.begin_submit().unwrap();
        let now = Instant::now();

        form.submission_succeeded(now, date!(2024 - 01 - 16));

        assert_ne!(form.idempotency_key(), key);
        assert_eq!(form.draft().amount, "");
        assert_eq!(form.draft().date, "2024-01-16");
        assert_eq!(form.status(), &FormStatus::Success { since: now });
    }

    #[test]
    fn success_returns_to_idle_after_delay() {
        let mut form = filled_form();
        form.begin_submit().unwrap();
        let now = Instant::now();
        form.submission_succeeded(now, date!(2024 - 01 - 15));

        form.tick(now + Duration::from_millis(500));
        assert_eq!(form.status(), &FormStatus::Success { since: now });

        form.tick(now + SUCCESS_RESET_DELAY);
        assert_eq!(form.status(), &FormStatus::Idle);
    }

    #[test]
    fn failure_keeps_key_and_text() {
        let mut form = filled_form();
        let key = form.idempotency_key().to_owned();
        form.begin_submit().unwrap();

        form.submission_failed(&ClientError::Server(StatusCode::INTERNAL_SERVER_ERROR));

        assert_eq!(form.idempotency_key(), key);
        assert_eq!(form.draft().amount, "25.50");
        assert_eq!(
            form.status(),
            &FormStatus::Error(SERVER_ERROR_MESSAGE.to_owned())
        );
        assert!(form.begin_submit().is_some());
    }

    #[test]
    fn failure_shows_server_field_errors() {
        let mut form = filled_form();
        form.begin_submit().unwrap();

        form.submission_failed(&ClientError::Api {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Category must be one of: Food".to_owned(),
            field_errors: vec![FieldError::new("category", "Category must be one of: Food")],
        });

        assert_eq!(
            form.errors().message_for("category"),
            Some("Category must be one of: Food")
        );
    }

    #[tokio::test]
    async fn submit_saves_expense_and_starts_new_entry() {
        let client = serve_client(CategoryPolicy::FreeText).await;
        let mut form = filled_form();
        let key = form.idempotency_key().to_owned();

        let created = form.submit(&client).await.unwrap();

        assert!(created.created);
        assert_eq!(created.expense.idempotency_key, key);
        assert_ne!(form.idempotency_key(), key);
        assert!(matches!(form.status(), FormStatus::Success { .. }));
    }

    #[tokio::test]
    async fn rejected_submit_keeps_entry() {
        let client = serve_client(CategoryPolicy::Restricted(vec!["Food".to_owned()])).await;
        let mut form = filled_form();
        form.set_field(FormField::Category, "Travel");
        let key = form.idempotency_key().to_owned();

        let created = form.submit(&client).await;

        assert_eq!(created, None);
        assert_eq!(form.idempotency_key(), key);
        assert_eq!(
            form.errors().message_for("category"),
            Some("Category must be one of: Food")
        );
        assert_eq!(
            form.status(),
            &FormStatus::Error("Category must be one of: Food".to_owned())
        );
    }
}
