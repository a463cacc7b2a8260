//! Two-location transfer coordination.
//!
//! A transfer is a debit leg at the source and a credit leg at the
//! destination, committed as one batch: either both stock records move and
//! both journal entries land, or nothing does. Insufficient stock at the
//! source surfaces from planning the debit leg, before anything is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use stocktrail_core::{LedgerError, LedgerResult, LocationId, ProductId, UserId};
use stocktrail_ledger::{MovementRecord, MovementRequest, TransferDirection};

use crate::catalog::Catalog;
use crate::engine::MovementEngine;
use crate::ledger_store::{LedgerStore, LedgerStoreError};

/// A requested transfer between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub actor_id: UserId,
    /// Positive quantity to move.
    pub quantity: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a completed transfer: both legs' journal entries, grouped by a
/// shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    /// Reference shared by both legs (with `-out`/`-in` suffixes).
    pub reference: String,
    pub outgoing: MovementRecord,
    pub incoming: MovementRecord,
}

/// Coordinates the two movement legs of a transfer over one engine.
#[derive(Debug, Clone)]
pub struct TransferCoordinator<S, C> {
    engine: MovementEngine<S, C>,
}

impl<S, C> TransferCoordinator<S, C> {
    pub fn new(engine: MovementEngine<S, C>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &MovementEngine<S, C> {
        &self.engine
    }
}

impl<S, C> TransferCoordinator<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    /// Move `quantity` of a product from one location to another.
    ///
    /// Both legs share one atomic commit; a conflict on either record retries
    /// the whole prepare+commit cycle (bounded, same limit as the engine).
    pub fn transfer(&self, request: &TransferRequest) -> LedgerResult<TransferOutcome> {
        if request.from_location_id == request.to_location_id {
            return Err(LedgerError::invalid(
                "transfer requires two distinct locations",
            ));
        }
        if request.quantity <= 0 {
            return Err(LedgerError::invalid("quantity must be positive"));
        }

        self.engine.ensure_product(request.product_id)?;
        self.engine.ensure_location(request.from_location_id)?;
        self.engine.ensure_location(request.to_location_id)?;

        let reference = mint_reference();
        let outgoing_request = self
            .leg(request, request.from_location_id, TransferDirection::Outgoing)
            .with_reference(format!("{reference}-out"));
        let incoming_request = self
            .leg(request, request.to_location_id, TransferDirection::Incoming)
            .with_reference(format!("{reference}-in"));

        let mut attempt = 0u32;
        loop {
            // Debit leg first: insufficient stock stops the transfer here.
            let outgoing = self.engine.prepare(&outgoing_request)?;
            let incoming = self.engine.prepare(&incoming_request)?;

            match self
                .engine
                .store
                .commit(vec![outgoing.write, incoming.write])
            {
                Ok(_) => {
                    debug!(
                        quantity = request.quantity,
                        reference = reference.as_str(),
                        "transfer committed"
                    );
                    return Ok(TransferOutcome {
                        reference,
                        outgoing: outgoing.movement,
                        incoming: incoming.movement,
                    });
                }
                Err(LedgerStoreError::Conflict { current, .. })
                    if attempt < self.engine.max_retries =>
                {
                    attempt += 1;
                    warn!(attempt, current, "transfer hit a conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn leg(
        &self,
        request: &TransferRequest,
        location_id: LocationId,
        direction: TransferDirection,
    ) -> MovementRequest {
        let mut leg = MovementRequest::transfer_leg(
            request.product_id,
            location_id,
            request.actor_id,
            request.quantity,
            direction,
            request.occurred_at,
        );
        leg.notes = request.notes.clone();
        leg
    }
}

/// Collision-resistant grouping reference for a transfer's two legs.
fn mint_reference() -> String {
    format!("XFER-{}", Uuid::now_v7().simple())
}
