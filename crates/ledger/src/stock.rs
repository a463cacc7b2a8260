use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stocktrail_core::{LocationId, ProductId};

/// Identity of one product's stock at one location.
///
/// Exactly one [`StockRecord`] exists per key; this pair is the unit of
/// contention for all concurrent mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

/// Current on-hand stock for one product at one location.
///
/// `quantity` never goes below zero. All mutation goes through the ledger
/// commit path, which pairs every quantity change with a movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    /// Unit cost in smallest currency unit (e.g., cents).
    pub unit_cost: i64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Fresh record for a pair that has not seen a movement yet.
    pub fn empty(key: StockKey, at: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            unit_cost: 0,
            batch_number: None,
            expiry_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}
