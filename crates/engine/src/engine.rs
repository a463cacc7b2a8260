//! Movement execution pipeline (application-level orchestration).
//!
//! Every quantity mutation in the system flows through [`MovementEngine`]:
//!
//! ```text
//! MovementRequest
//!   ↓
//! 1. Validate request shape (no storage touched)
//!   ↓
//! 2. Re-check product/location existence (catalog)
//!   ↓
//! 3. Load or lazily create the stock record, capture previous_quantity
//!   ↓
//! 4. Plan the transition (pure decision logic; insufficient stock stops here)
//!   ↓
//! 5. Commit {quantity update, journal append} as one atomic unit
//!   ↓  on compare-and-set conflict: retry from 3, bounded
//! MovementOutcome
//! ```
//!
//! The engine holds no locks of its own; correctness under concurrent
//! invocation is delegated to the store's compare-and-set commit. No other
//! code path may write a stock quantity.

use tracing::{debug, warn};

use stocktrail_core::{EntityKind, LedgerError, LedgerResult, LocationId, MovementId, ProductId};
use stocktrail_ledger::{MovementRecord, MovementRequest, StockRecord, plan};

use crate::catalog::Catalog;
use crate::ledger_store::{LedgerStore, LedgerStoreError, LedgerWrite};

/// Bounded retry count for compare-and-set conflicts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Result of a successfully applied movement.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementOutcome {
    /// The stock record after the mutation.
    pub record: StockRecord,
    /// The journal entry committed with it.
    pub movement: MovementRecord,
}

/// One planned leg: the write to commit plus the state it produces.
#[derive(Debug, Clone)]
pub(crate) struct PreparedMovement {
    pub(crate) write: LedgerWrite,
    pub(crate) record: StockRecord,
    pub(crate) movement: MovementRecord,
}

/// The transactional core of the ledger.
///
/// Generic over the store and catalog traits so tests run against the
/// in-memory implementations and production wires in the Postgres store.
#[derive(Debug, Clone)]
pub struct MovementEngine<S, C> {
    pub(crate) store: S,
    pub(crate) catalog: C,
    pub(crate) max_retries: u32,
}

impl<S, C> MovementEngine<S, C> {
    pub fn new(store: S, catalog: C) -> Self {
        Self {
            store,
            catalog,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, C> MovementEngine<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    /// Apply one stock movement: validate, plan, and commit atomically.
    ///
    /// Returns the updated record and the committed journal entry, or a
    /// domain error. Only compare-and-set conflicts are retried (bounded);
    /// `InsufficientStock` is a business-rule rejection and is returned
    /// immediately with nothing written.
    pub fn apply_movement(&self, request: &MovementRequest) -> LedgerResult<MovementOutcome> {
        request.validate()?;
        self.ensure_product(request.product_id)?;
        self.ensure_location(request.location_id)?;

        let mut attempt = 0u32;
        loop {
            let prepared = self.prepare(request)?;
            match self.store.commit(vec![prepared.write]) {
                Ok(_) => {
                    debug!(
                        kind = request.kind.as_str(),
                        quantity = request.quantity,
                        new_quantity = prepared.record.quantity,
                        "movement committed"
                    );
                    return Ok(MovementOutcome {
                        record: prepared.record,
                        movement: prepared.movement,
                    });
                }
                Err(LedgerStoreError::Conflict { current, .. }) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        current,
                        kind = request.kind.as_str(),
                        "compare-and-set conflict, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Plan one movement against current state without committing.
    ///
    /// Used by `apply_movement` and by the transfer coordinator, which
    /// commits two prepared legs in a single batch.
    pub(crate) fn prepare(&self, request: &MovementRequest) -> LedgerResult<PreparedMovement> {
        let mut record = self
            .store
            .get_or_create(request.key(), request.occurred_at)?;

        let planned = plan(record.quantity, request)?;
        let movement = MovementRecord::from_plan(MovementId::new(), request, planned);

        let write = LedgerWrite {
            key: request.key(),
            expected_quantity: planned.previous_quantity,
            new_quantity: planned.new_quantity,
            unit_cost: request.unit_cost,
            batch_number: request.batch_number.clone(),
            expiry_date: request.expiry_date,
            movement: movement.clone(),
        };

        record.quantity = planned.new_quantity;
        if let Some(unit_cost) = request.unit_cost {
            record.unit_cost = unit_cost;
        }
        if let Some(batch_number) = &request.batch_number {
            record.batch_number = Some(batch_number.clone());
        }
        if let Some(expiry_date) = request.expiry_date {
            record.expiry_date = Some(expiry_date);
        }
        record.updated_at = request.occurred_at;

        Ok(PreparedMovement {
            write,
            record,
            movement,
        })
    }

    pub(crate) fn ensure_product(&self, product_id: ProductId) -> LedgerResult<()> {
        if !self.catalog.product_exists(product_id) {
            return Err(LedgerError::not_found(EntityKind::Product));
        }
        Ok(())
    }

    pub(crate) fn ensure_location(&self, location_id: LocationId) -> LedgerResult<()> {
        if self.catalog.location(location_id).is_none() {
            return Err(LedgerError::not_found(EntityKind::Location));
        }
        Ok(())
    }
}

impl From<LedgerStoreError> for LedgerError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::Conflict {
                expected, current, ..
            } => LedgerError::conflict(format!(
                "expected quantity {expected}, found {current}"
            )),
            LedgerStoreError::UnknownRecord(_) => LedgerError::not_found(EntityKind::Stock),
            LedgerStoreError::InvalidWrite(msg) => LedgerError::invalid(msg),
            LedgerStoreError::Storage(msg) => LedgerError::storage(msg),
        }
    }
}
