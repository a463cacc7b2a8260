//! Stock ledger domain module.
//!
//! This crate contains the business rules for on-hand stock and its movement
//! audit trail, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod movement;
pub mod stock;

pub use movement::{
    MovementKind, MovementRecord, MovementRequest, PlannedMovement, TransferDirection, plan,
};
pub use stock::{StockKey, StockRecord};
