//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Kind of entity a movement request references.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    Location,
    Stock,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            EntityKind::Product => "product",
            EntityKind::Location => "location",
            EntityKind::Stock => "stock record",
        };
        f.write_str(s)
    }
}

/// Ledger-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// insufficient stock, missing references). Storage backend failures are
/// carried in `Storage` after mapping at the engine boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The request was malformed (e.g. non-positive quantity); rejected
    /// before any storage access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The referenced product/location/stock record does not exist.
    #[error("{0} not found")]
    NotFound(EntityKind),

    /// The requested outflow exceeds the on-hand quantity. Business-rule
    /// rejection; never retried.
    #[error("insufficient stock, {available} available")]
    InsufficientStock { available: i64 },

    /// Concurrent writers raced on the same stock record and retries were
    /// exhausted. The whole operation is safe to retry.
    #[error("the item was updated concurrently, please retry: {0}")]
    Conflict(String),

    /// The storage backend failed (infrastructure, not a business rule).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(entity: EntityKind) -> Self {
        Self::NotFound(entity)
    }

    pub fn insufficient(available: i64) -> Self {
        Self::InsufficientStock { available }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Only concurrent-update conflicts are worth retrying; every other
    /// variant is deterministic for the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
