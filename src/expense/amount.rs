//! A fixed-precision amount of money.

use std::{fmt, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The maximum number of digits allowed after the decimal point.
pub const MAX_DECIMAL_PLACES: usize = 2;

/// A positive amount of money with at most [MAX_DECIMAL_PLACES] decimal places.
///
/// Amounts are decimal rather than binary floating point, so "10.10" is stored
/// and sent back as "10.10" rather than something like "10.099999999999999".
/// The number of decimal places written by the client is kept, e.g. "25.5"
/// stays "25.5".
///
/// Amounts are serialized as JSON strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount(Decimal);

/// The reasons a string is not a valid [Amount].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The string is not a plain decimal number, e.g. "abc", "1e5" or "1.".
    #[error("Amount must be a number")]
    NotANumber,
    /// The number is zero or negative.
    #[error("Amount must be positive")]
    NotPositive,
    /// The number has more than [MAX_DECIMAL_PLACES] decimal places.
    #[error("Max 2 decimal places")]
    TooManyDecimalPlaces,
    /// The number has too many digits to be stored exactly.
    #[error("Amount is too large")]
    TooLarge,
}

impl Amount {
    /// The amount as a decimal number.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse an amount written as digits with an optional fractional part,
    /// e.g. "25", "25.5" or "25.50". Surrounding whitespace is ignored.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();

        let (is_negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (unsigned, None),
        };

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

        if !all_digits(whole) || !fraction.is_none_or(all_digits) {
            return Err(AmountError::NotANumber);
        }

        if is_negative {
            return Err(AmountError::NotPositive);
        }

        if fraction.is_some_and(|fraction| fraction.len() > MAX_DECIMAL_PLACES) {
            return Err(AmountError::TooManyDecimalPlaces);
        }

        let decimal = Decimal::from_str(unsigned).map_err(|_| AmountError::TooLarge)?;

        // Digits that do not fit in 96 bits are rounded away instead of failing.
        let scale = fraction.map_or(0, str::len);
        if decimal.scale() as usize != scale {
            return Err(AmountError::TooLarge);
        }

        if decimal <= Decimal::ZERO {
            return Err(AmountError::NotPositive);
        }

        Ok(Self(decimal))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;

        text.parse().map_err(serde::de::Error::custom)
    }
}

impl ToSql for Amount {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        text.parse()
            .map_err(|error: AmountError| FromSqlError::Other(Box::new(error)))
    }
}
