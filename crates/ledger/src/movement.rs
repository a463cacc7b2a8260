use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stocktrail_core::{LedgerError, LedgerResult, LocationId, MovementId, ProductId, UserId};

use crate::stock::StockKey;

/// Kind of stock movement, as recorded in the journal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Stock received into a location.
    #[serde(rename = "in")]
    Inbound,
    /// Stock leaving a location.
    #[serde(rename = "out")]
    Outbound,
    /// Manual correction; additive.
    Adjustment,
    /// One leg (debit or credit) of a two-location transfer.
    #[serde(rename = "transfer")]
    TransferLeg,
}

impl MovementKind {
    /// Wire/storage name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "in",
            MovementKind::Outbound => "out",
            MovementKind::Adjustment => "adjustment",
            MovementKind::TransferLeg => "transfer",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::Inbound),
            "out" => Ok(MovementKind::Outbound),
            "adjustment" => Ok(MovementKind::Adjustment),
            "transfer" => Ok(MovementKind::TransferLeg),
            other => Err(LedgerError::invalid(format!(
                "unsupported movement kind: {other}"
            ))),
        }
    }
}

/// Which side of a transfer a transfer-leg movement is on.
///
/// The direction carries the sign of the delta, so nothing downstream has to
/// special-case transfer handling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Debit side: stock leaves the source location.
    Outgoing,
    /// Credit side: stock arrives at the destination location.
    Incoming,
}

/// A requested stock movement (not yet applied).
///
/// `quantity` is always the positive magnitude of the change; the sign comes
/// from `kind` (and `direction` for transfer legs). `occurred_at` is supplied
/// by the caller so replays and tests stay deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub actor_id: UserId,
    pub kind: MovementKind,
    /// Positive magnitude of the requested change.
    pub quantity: i64,
    /// Required for (and only for) transfer legs.
    pub direction: Option<TransferDirection>,
    pub notes: Option<String>,
    pub reference: Option<String>,
    /// Unit cost in smallest currency unit; patched onto the stock record
    /// when present.
    pub unit_cost: Option<i64>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRequest {
    fn base(
        product_id: ProductId,
        location_id: LocationId,
        actor_id: UserId,
        kind: MovementKind,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            location_id,
            actor_id,
            kind,
            quantity,
            direction: None,
            notes: None,
            reference: None,
            unit_cost: None,
            batch_number: None,
            expiry_date: None,
            occurred_at,
        }
    }

    /// Stock received into a location (`in`).
    pub fn inbound(
        product_id: ProductId,
        location_id: LocationId,
        actor_id: UserId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::base(
            product_id,
            location_id,
            actor_id,
            MovementKind::Inbound,
            quantity,
            occurred_at,
        )
    }

    /// Stock leaving a location (`out`).
    pub fn outbound(
        product_id: ProductId,
        location_id: LocationId,
        actor_id: UserId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::base(
            product_id,
            location_id,
            actor_id,
            MovementKind::Outbound,
            quantity,
            occurred_at,
        )
    }

    /// Manual additive correction (`adjustment`).
    pub fn adjustment(
        product_id: ProductId,
        location_id: LocationId,
        actor_id: UserId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::base(
            product_id,
            location_id,
            actor_id,
            MovementKind::Adjustment,
            quantity,
            occurred_at,
        )
    }

    /// One leg of a transfer; the coordinator supplies the direction.
    pub fn transfer_leg(
        product_id: ProductId,
        location_id: LocationId,
        actor_id: UserId,
        quantity: i64,
        direction: TransferDirection,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let mut request = Self::base(
            product_id,
            location_id,
            actor_id,
            MovementKind::TransferLeg,
            quantity,
            occurred_at,
        );
        request.direction = Some(direction);
        request
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: i64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_batch(mut self, batch_number: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch_number = Some(batch_number.into());
        self.expiry_date = expiry_date;
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// Reject malformed requests before any storage access.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity <= 0 {
            return Err(LedgerError::invalid("quantity must be positive"));
        }
        match (self.kind, self.direction) {
            (MovementKind::TransferLeg, None) => {
                return Err(LedgerError::invalid("transfer leg requires a direction"));
            }
            (MovementKind::TransferLeg, Some(_)) => {}
            (_, Some(_)) => {
                return Err(LedgerError::invalid(
                    "direction is only valid on transfer legs",
                ));
            }
            (_, None) => {}
        }
        if let Some(unit_cost) = self.unit_cost {
            if unit_cost < 0 {
                return Err(LedgerError::invalid("unit cost cannot be negative"));
            }
        }
        Ok(())
    }

    /// Signed delta this request applies to the on-hand quantity.
    ///
    /// `in` and `adjustment` add, `out` subtracts; transfer legs take their
    /// sign from `direction`.
    pub fn signed_delta(&self) -> LedgerResult<i64> {
        match self.kind {
            MovementKind::Inbound | MovementKind::Adjustment => Ok(self.quantity),
            MovementKind::Outbound => Ok(-self.quantity),
            MovementKind::TransferLeg => match self.direction {
                Some(TransferDirection::Incoming) => Ok(self.quantity),
                Some(TransferDirection::Outgoing) => Ok(-self.quantity),
                None => Err(LedgerError::invalid("transfer leg requires a direction")),
            },
        }
    }
}

/// Quantity transition decided for a movement request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlannedMovement {
    pub previous_quantity: i64,
    pub new_quantity: i64,
}

/// Decide the quantity transition for `request` against the current on-hand
/// quantity.
///
/// Pure decision logic, no IO. Fails with `InsufficientStock` (carrying the
/// available quantity) when the delta would take stock below zero; nothing
/// may be written on any failure path.
pub fn plan(on_hand: i64, request: &MovementRequest) -> LedgerResult<PlannedMovement> {
    request.validate()?;
    let delta = request.signed_delta()?;

    let new_quantity = on_hand + delta;
    if new_quantity < 0 {
        return Err(LedgerError::insufficient(on_hand));
    }

    Ok(PlannedMovement {
        previous_quantity: on_hand,
        new_quantity,
    })
}

/// Immutable audit-trail entry for one applied quantity change.
///
/// `previous_quantity` is the on-hand quantity at the instant the paired
/// compare-and-set succeeded; `new_quantity - previous_quantity` recovers the
/// signed delta. Never mutated or deleted by normal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub actor_id: UserId,
    pub kind: MovementKind,
    /// Positive magnitude of the delta as applied.
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Build the journal entry for a planned movement.
    pub fn from_plan(id: MovementId, request: &MovementRequest, planned: PlannedMovement) -> Self {
        Self {
            id,
            product_id: request.product_id,
            location_id: request.location_id,
            actor_id: request.actor_id,
            kind: request.kind,
            quantity: request.quantity,
            previous_quantity: planned.previous_quantity,
            new_quantity: planned.new_quantity,
            notes: request.notes.clone(),
            reference: request.reference.clone(),
            occurred_at: request.occurred_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    /// Signed delta applied by this movement.
    pub fn signed_delta(&self) -> i64 {
        self.new_quantity - self.previous_quantity
    }
}
