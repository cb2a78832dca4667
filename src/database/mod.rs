// Postgres-backed stores.

pub mod repositories;

pub use repositories::{PgReportStore, PgTrophyStore, PgUserStore};

use crate::error::StoreError;

/// Map a unique-constraint violation onto [`StoreError::Duplicate`].
pub(crate) fn map_unique(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(e),
    }
}
