//! Movement journal query interface for audit views and dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrail_core::{LocationId, ProductId, UserId};
use stocktrail_ledger::{MovementKind, MovementRecord};

use super::r#trait::LedgerStoreError;

/// Pagination parameters for journal queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50, // Safe default
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000), // Cap at 1000 for safety
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for journal queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    /// Filter by product (optional).
    pub product_id: Option<ProductId>,
    /// Filter by location (optional).
    pub location_id: Option<LocationId>,
    /// Filter by acting user (optional).
    pub actor_id: Option<UserId>,
    /// Filter by movement kind (optional).
    pub kind: Option<MovementKind>,
    /// Movements that occurred at or after this time (optional).
    pub occurred_after: Option<DateTime<Utc>>,
    /// Movements that occurred at or before this time (optional).
    pub occurred_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    /// Filter for one product's full history.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    /// Whether a movement record passes this filter.
    pub fn matches(&self, movement: &MovementRecord) -> bool {
        if let Some(product_id) = self.product_id {
            if movement.product_id != product_id {
                return false;
            }
        }
        if let Some(location_id) = self.location_id {
            if movement.location_id != location_id {
                return false;
            }
        }
        if let Some(actor_id) = self.actor_id {
            if movement.actor_id != actor_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if movement.kind != kind {
                return false;
            }
        }
        if let Some(after) = self.occurred_after {
            if movement.occurred_at < after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if movement.occurred_at > before {
                return false;
            }
        }
        true
    }
}

/// Paginated journal query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementQueryResult {
    /// The movements matching the query.
    pub movements: Vec<MovementRecord>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    /// Pagination parameters used.
    pub pagination: Pagination,
    /// Whether there are more movements available.
    pub has_more: bool,
}

/// Read-only journal access.
///
/// Movements are returned ordered by `occurred_at`, then id. Ids are UUIDv7,
/// so within one timestamp id order is mint order.
pub trait MovementQuery: Send + Sync {
    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementQueryResult, LedgerStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_caps_the_limit() {
        let p = Pagination::new(Some(5000), None);
        assert_eq!(p.limit, 1000);
        assert_eq!(p.offset, 0);

        let p = Pagination::new(None, Some(20));
        assert_eq!(p.limit, 50);
        assert_eq!(p.offset, 20);
    }
}
