//! SQLite and in-memory implementations of the marketplace store ports.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use fabmarket_core::store::StoreError;

use crate::DbPool;

pub mod directory;
pub mod memory;
pub mod quote;
pub mod review;

pub use memory::InMemoryMarketplaceStore;
pub use quote::SqlQuoteUnitOfWork;

/// SQLite-backed store implementing every marketplace port over one pool.
#[derive(Clone)]
pub struct SqlMarketplaceStore {
    pool: DbPool,
}

impl SqlMarketplaceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Unique-constraint violations become [`StoreError::Conflict`].
pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(database) if database.is_unique_violation() => {
            StoreError::Conflict(database.message().to_owned())
        }
        _ => StoreError::Database(error.to_string()),
    }
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| StoreError::Decode(format!("column `{name}`: {error}")))
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| StoreError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, StoreError> {
    Decimal::from_str(&value).map_err(|error| {
        StoreError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| {
        StoreError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_enum<T>(column: &str, value: String) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| StoreError::Decode(format!("invalid value in `{column}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_timestamp, parse_timestamp};

    #[test]
    fn timestamps_are_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().expect("timestamp");
        let formatted = format_timestamp(&whole);
        assert_eq!(formatted, "2024-01-02T03:04:05.000000Z");
        assert_eq!(parse_timestamp("created_at", formatted).expect("parse"), whole);
    }
}
