use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use routetracker_core::directory::DirectoryError;
use routetracker_core::roles::RoleRegistryError;
use routetracker_core::store::StoreError;

pub mod profile;
pub mod roles;
pub mod voucher;

pub use profile::SqlProfileDirectory;
pub use roles::SqlRoleRegistry;
pub use voucher::SqlVoucherStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<RepositoryError> for RoleRegistryError {
    fn from(error: RepositoryError) -> Self {
        RoleRegistryError::Unavailable(error.to_string())
    }
}

impl From<RepositoryError> for DirectoryError {
    fn from(error: RepositoryError) -> Self {
        DirectoryError::Unavailable(error.to_string())
    }
}

/// Fixed-width UTC text so lexical `ORDER BY` on timestamp columns matches chronological order.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn decode_column<'r, T>(
    row: &'r sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}
