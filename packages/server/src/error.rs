use common::AssetError;
use sea_orm::{DbErr, SqlErr};

/// Map a database error into the asset taxonomy.
///
/// Unique-constraint violations become `Conflict` so callers can tell a
/// duplicate variant (or a lost entry-id race) apart from infrastructure
/// trouble; everything else is `Transient`.
pub fn map_db_err(err: DbErr) -> AssetError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        AssetError::Conflict(err.to_string())
    } else {
        AssetError::Transient(err.to_string())
    }
}
