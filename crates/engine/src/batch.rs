//! Bulk movement processing.
//!
//! Drives a sequence of independent movement requests through the engine,
//! collecting a per-item outcome for each. A business-rule failure on one
//! item never aborts the batch, and committed items stay committed: the
//! batch is explicitly not atomic across items. Callers should bound batch
//! sizes.

use serde::{Deserialize, Serialize};
use tracing::info;

use stocktrail_core::LedgerError;
use stocktrail_ledger::MovementRequest;

use crate::catalog::Catalog;
use crate::engine::{MovementEngine, MovementOutcome};
use crate::ledger_store::LedgerStore;

/// Outcome for one item of a batch, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemOutcome {
    pub index: usize,
    pub result: Result<MovementOutcome, LedgerError>,
}

/// Aggregate counts for one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-item outcomes plus the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<BatchItemOutcome>,
    pub summary: BatchSummary,
}

/// Processes bulk imports/scans item by item.
#[derive(Debug, Clone)]
pub struct BatchProcessor<S, C> {
    engine: MovementEngine<S, C>,
}

impl<S, C> BatchProcessor<S, C> {
    pub fn new(engine: MovementEngine<S, C>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &MovementEngine<S, C> {
        &self.engine
    }
}

impl<S, C> BatchProcessor<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    /// Apply each request independently, continuing past failed items.
    pub fn process_batch(&self, requests: &[MovementRequest]) -> BatchReport {
        let mut outcomes = Vec::with_capacity(requests.len());
        let mut succeeded = 0usize;

        for (index, request) in requests.iter().enumerate() {
            let result = self.engine.apply_movement(request);
            if result.is_ok() {
                succeeded += 1;
            }
            outcomes.push(BatchItemOutcome { index, result });
        }

        let summary = BatchSummary {
            total: requests.len(),
            succeeded,
            failed: requests.len() - succeeded,
        };
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch processed"
        );

        BatchReport { outcomes, summary }
    }
}
