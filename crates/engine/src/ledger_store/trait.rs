use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use stocktrail_core::ProductId;
use stocktrail_ledger::{MovementRecord, StockKey, StockRecord};

/// One ledger mutation, ready to commit (not yet persisted).
///
/// A write pairs the compare-and-set expectation on a stock record with the
/// journal entry that documents the change. The store applies the quantity
/// update and the journal append as one unit; the movement's
/// `previous_quantity`/`new_quantity` must agree with
/// `expected_quantity`/`new_quantity`, which is what keeps the journal
/// causally consistent with the record it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWrite {
    pub key: StockKey,
    /// Quantity the writer observed when planning; the commit fails with a
    /// conflict if the stored quantity has moved since.
    pub expected_quantity: i64,
    pub new_quantity: i64,
    /// Stock-record detail updates riding along with the movement.
    pub unit_cost: Option<i64>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub movement: MovementRecord,
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, malformed
/// batches) as opposed to domain errors (validation, insufficient stock).
/// The movement engine maps them into the domain taxonomy at its boundary.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// Compare-and-set failed: another writer changed the quantity between
    /// the read and this commit.
    #[error("compare-and-set conflict on {key}: expected {expected}, found {current}")]
    Conflict {
        key: StockKey,
        expected: i64,
        current: i64,
    },

    /// The write batch is inconsistent (duplicate keys, movement disagreeing
    /// with its write, negative target quantity).
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// The referenced stock record does not exist.
    #[error("unknown stock record: {0}")]
    UnknownRecord(StockKey),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable keyed storage for stock records plus the append-only movement
/// journal, kept in permanent agreement by a transactional commit.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with the in-memory implementation
///   (tests/dev) and SQL backends (production).
/// - **Compare-and-set**: every write names the quantity it observed; a
///   stale expectation fails the commit, which is how lost updates under
///   concurrent mutation of the same (product, location) pair are detected.
/// - **Atomic batches**: `commit` applies **all** writes or **none**. A
///   single-element batch is one movement's atomic {quantity update, journal
///   append}; a two-element batch is a transfer's shared transaction across
///   both locations.
/// - **Append-only journal**: movement records are never modified or deleted
///   through this interface.
pub trait LedgerStore: Send + Sync {
    /// Load the record for a pair, creating it with quantity 0 if absent.
    fn get_or_create(
        &self,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, LedgerStoreError>;

    /// Read a record without creating it.
    fn get(&self, key: StockKey) -> Result<Option<StockRecord>, LedgerStoreError>;

    /// All records for a product across locations (audit views, dashboards).
    fn list_for_product(&self, product_id: ProductId)
    -> Result<Vec<StockRecord>, LedgerStoreError>;

    /// Atomically apply a batch of ledger writes.
    ///
    /// Implementations must:
    /// - check every compare-and-set expectation before mutating anything
    /// - apply quantity updates and journal appends all-or-nothing
    /// - fail the whole batch with `Conflict` on the first stale expectation
    fn commit(&self, writes: Vec<LedgerWrite>) -> Result<Vec<MovementRecord>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get_or_create(
        &self,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, LedgerStoreError> {
        (**self).get_or_create(key, at)
    }

    fn get(&self, key: StockKey) -> Result<Option<StockRecord>, LedgerStoreError> {
        (**self).get(key)
    }

    fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        (**self).list_for_product(product_id)
    }

    fn commit(&self, writes: Vec<LedgerWrite>) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        (**self).commit(writes)
    }
}

/// Validate the internal consistency of a write batch before any mutation.
///
/// Shared by store implementations: duplicate keys in one batch are rejected
/// (a batch must touch distinct records), every movement must describe
/// exactly the transition its write performs, and no write may target a
/// negative quantity.
pub(crate) fn validate_batch(writes: &[LedgerWrite]) -> Result<(), LedgerStoreError> {
    for (idx, write) in writes.iter().enumerate() {
        if write.new_quantity < 0 {
            return Err(LedgerStoreError::InvalidWrite(format!(
                "write targets negative quantity (index {idx})"
            )));
        }
        if write.movement.key() != write.key {
            return Err(LedgerStoreError::InvalidWrite(format!(
                "movement key does not match write key (index {idx})"
            )));
        }
        if write.movement.previous_quantity != write.expected_quantity
            || write.movement.new_quantity != write.new_quantity
        {
            return Err(LedgerStoreError::InvalidWrite(format!(
                "movement quantities disagree with the write (index {idx})"
            )));
        }
        if writes[..idx].iter().any(|w| w.key == write.key) {
            return Err(LedgerStoreError::InvalidWrite(format!(
                "batch contains duplicate key {} (index {idx})",
                write.key
            )));
        }
    }
    Ok(())
}
