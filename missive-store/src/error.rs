//! Error types for the missive-store crate.

use thiserror::Error;

/// Storage error type.
///
/// Returned by every [`SubscriberStore`](crate::SubscriberStore) and
/// [`SuppressionList`](crate::SuppressionList) operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No subscriber exists for the address.
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    /// The backing service rejected or failed the request.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if the error only says the record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Specialized `Result` type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
