use common::{BasketValidationError, BuyerId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the basket store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    ///
    /// Kept distinct from "not found" so callers can report the backend as
    /// unavailable instead of treating the basket as empty.
    #[error("Basket store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write found a different version than expected.
    #[error(
        "Concurrency conflict for basket {buyer_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        buyer_id: BuyerId,
        expected: Version,
        actual: Version,
    },

    /// The basket violates a per-basket invariant.
    #[error("Invalid basket: {0}")]
    InvalidBasket(#[from] BasketValidationError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the error means the backend could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other),
        }
    }
}

/// Result type for basket store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_map_to_unavailable() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_unavailable());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(StoreError::from(sqlx::Error::Io(io)).is_unavailable());
    }

    #[test]
    fn other_database_errors_stay_database() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }
}
