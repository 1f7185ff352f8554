//! Turns the raw body of a create expense request into a validated [NewExpense].

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    CategoryPolicy,
    expense::{Amount, AmountError, NewExpense},
};

/// The max number of characters in a category label.
pub const MAX_CATEGORY_LENGTH: usize = 100;
/// The max number of characters in an expense description.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// A validation failure for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The name of the field as it appears in the request.
    pub field: String,
    /// A message describing how to fix the field.
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_owned(),
            message: message.to_owned(),
        }
    }
}

/// The validation failures for a request, at most one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    /// The failed fields in the order they were checked.
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Record a failure for `field`, unless that field already has one.
    pub fn add(&mut self, field: &str, message: &str) {
        if self.message_for(field).is_none() {
            self.errors.push(FieldError::new(field, message));
        }
    }

    /// The message recorded for `field`, if any.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    /// Remove the failure recorded for `field`, if any.
    pub fn remove(&mut self, field: &str) {
        self.errors.retain(|error| error.field != field);
    }

    /// Whether no fields have failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();

        write!(f, "{}", messages.join(", "))
    }
}

/// The JSON body of a request to create an expense.
///
/// Every field is optional and accepts any JSON value here so that missing
/// fields and fields of the wrong type are reported as validation errors
/// rather than a generic parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseForm {
    /// Identifies the logical write attempt, generated by the client.
    pub idempotency_key: Option<Value>,
    /// Either a JSON number or a numeric string.
    pub amount: Option<Value>,
    /// The category label.
    pub category: Option<Value>,
    /// What the expense was for.
    pub description: Option<Value>,
    /// The calendar date of the expense in ISO 8601 format.
    pub date: Option<Value>,
}

/// Check every field of `form` and build a [NewExpense] with trimmed text.
///
/// # Errors
/// Returns one [FieldError] for each field that failed validation.
pub fn validate_expense(
    form: ExpenseForm,
    category_policy: &CategoryPolicy,
) -> Result<NewExpense, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let idempotency_key = match form.idempotency_key {
        Some(Value::String(key)) if !key.trim().is_empty() => Some(key),
        None | Some(Value::Null | Value::String(_)) => {
            errors.add("idempotencyKey", "idempotencyKey is required");
            None
        }
        Some(_) => {
            errors.add("idempotencyKey", "idempotencyKey must be a string");
            None
        }
    };

    let amount = match form.amount.as_ref().and_then(parse_amount) {
        None => {
            errors.add("amount", "Amount is required");
            None
        }
        Some(amount) => match amount {
            Ok(amount) => Some(amount),
            Err(AmountError::NotANumber | AmountError::NotPositive) => {
                errors.add("amount", "Amount must be positive");
                None
            }
            Err(AmountError::TooManyDecimalPlaces) => {
                errors.add("amount", "Max 2 decimal places");
                None
            }
            Err(AmountError::TooLarge) => {
                errors.add("amount", "Amount is too large");
                None
            }
        },
    };

    let category = match check_text(form.category.as_ref(), MAX_CATEGORY_LENGTH) {
        Err(TextError::Missing) => {
            errors.add("category", "Category is required");
            None
        }
        Err(TextError::NotText) => {
            errors.add("category", "Category must be a string");
            None
        }
        Err(TextError::TooLong) => {
            errors.add(
                "category",
                &format!("Category must be at most {MAX_CATEGORY_LENGTH} characters"),
            );
            None
        }
        Ok(category) => match category_policy.resolve(category) {
            Some(category) => Some(category),
            None => {
                errors.add("category", &restricted_category_message(category_policy));
                None
            }
        },
    };

    let description = match check_text(form.description.as_ref(), MAX_DESCRIPTION_LENGTH) {
        Err(TextError::Missing) => {
            errors.add("description", "Description is required");
            None
        }
        Err(TextError::NotText) => {
            errors.add("description", "Description must be a string");
            None
        }
        Err(TextError::TooLong) => {
            errors.add(
                "description",
                &format!("Description must be at most {MAX_DESCRIPTION_LENGTH} characters"),
            );
            None
        }
        Ok(description) => Some(description.to_owned()),
    };

    let date = form
        .date
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_expense_date);
    if date.is_none() {
        errors.add("date", "Valid date required");
    }

    match (idempotency_key, amount, category, description, date) {
        (Some(idempotency_key), Some(amount), Some(category), Some(description), Some(date))
            if errors.is_empty() =>
        {
            Ok(NewExpense {
                idempotency_key,
                amount,
                category,
                description,
                date,
            })
        }
        _ => Err(errors),
    }
}

/// Parse the date of an expense.
///
/// Accepts a calendar date such as "2024-01-15", or an RFC 3339 timestamp
/// such as "2024-01-15T10:30:00Z" whose date part is used.
pub fn parse_expense_date(text: &str) -> Option<Date> {
    let text = text.trim();

    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .ok()
        .or_else(|| {
            OffsetDateTime::parse(text, &Rfc3339)
                .ok()
                .map(|date_time| date_time.date())
        })
}

/// Count the user-perceived characters in `text`.
pub fn character_count(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Parse the amount of a request, or `None` if the amount is missing.
fn parse_amount(value: &Value) -> Option<Result<Amount, AmountError>> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.parse()),
        Value::Number(number) => Some(number_text(number).and_then(|text| text.parse())),
        // Booleans, arrays and objects are not amounts, but they were provided.
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Some(Err(AmountError::NotANumber)),
        Value::String(_) | Value::Null => None,
    }
}

/// Write a JSON number as a plain decimal.
///
/// JSON numbers are read as integers or `f64`, so trailing zeros in a
/// fraction are lost, e.g. `10.10` is read as 10.1. Send amounts as strings
/// to keep them. Numbers written in exponent form, e.g. `1e16`, are expanded.
fn number_text(number: &Number) -> Result<String, AmountError> {
    if number.as_f64().is_some_and(|value| value <= 0.0) {
        return Err(AmountError::NotPositive);
    }

    let text = number.to_string();
    let Some((mantissa, exponent)) = text.split_once(['e', 'E']) else {
        return Ok(text);
    };

    let mut decimal = Decimal::from_str(mantissa).map_err(|_| AmountError::NotANumber)?;
    let exponent: i32 = exponent.parse().map_err(|_| AmountError::NotANumber)?;

    if exponent >= 0 {
        for _ in 0..exponent {
            decimal = decimal
                .checked_mul(Decimal::TEN)
                .ok_or(AmountError::TooLarge)?;
        }
    } else {
        decimal
            .set_scale(decimal.scale() + exponent.unsigned_abs())
            .map_err(|_| AmountError::TooManyDecimalPlaces)?;
    }

    Ok(decimal.normalize().to_string())
}

enum TextError {
    Missing,
    NotText,
    TooLong,
}

fn check_text(value: Option<&Value>, max_length: usize) -> Result<&str, TextError> {
    let text = match value {
        None | Some(Value::Null) => "",
        Some(Value::String(text)) => text.trim(),
        Some(_) => return Err(TextError::NotText),
    };

    if text.is_empty() {
        Err(TextError::Missing)
    } else if character_count(text) > max_length {
        Err(TextError::TooLong)
    } else {
        Ok(text)
    }
}

fn restricted_category_message(category_policy: &CategoryPolicy) -> String {
    match category_policy {
        CategoryPolicy::FreeText => "Category is required".to_owned(),
        CategoryPolicy::Restricted(allowed) => {
            format!("Category must be one of: {}", allowed.join(", "))
        }
    }
}
