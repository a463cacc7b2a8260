//! Read-only catalog access (products, locations).
//!
//! Products, locations and warehouses are owned by the surrounding
//! application; the engine only re-checks that a movement's references exist
//! before writing. Actor identity arrives on the request itself and is used
//! for attribution only; capability checks happen before the engine is
//! invoked.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use stocktrail_core::{LocationId, ProductId, WarehouseId};

/// A storage location and its parent warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub id: LocationId,
    pub warehouse_id: WarehouseId,
    pub name: String,
}

/// Read-only existence/lookup interface for movement references.
pub trait Catalog: Send + Sync {
    fn product_exists(&self, product_id: ProductId) -> bool;
    fn location(&self, location_id: LocationId) -> Option<LocationInfo>;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn product_exists(&self, product_id: ProductId) -> bool {
        (**self).product_exists(product_id)
    }

    fn location(&self, location_id: LocationId) -> Option<LocationInfo> {
        (**self).location(location_id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashSet<ProductId>>,
    locations: RwLock<HashMap<LocationId, LocationInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product_id: ProductId) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product_id);
        }
    }

    pub fn add_location(&self, location: LocationInfo) {
        if let Ok(mut locations) = self.locations.write() {
            locations.insert(location.id, location);
        }
    }
}

impl Catalog for InMemoryCatalog {
    fn product_exists(&self, product_id: ProductId) -> bool {
        match self.products.read() {
            Ok(products) => products.contains(&product_id),
            Err(_) => false,
        }
    }

    fn location(&self, location_id: LocationId) -> Option<LocationInfo> {
        let locations = self.locations.read().ok()?;
        locations.get(&location_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_reflects_registered_entries() {
        let catalog = InMemoryCatalog::new();
        let product_id = ProductId::new();
        let location = LocationInfo {
            id: LocationId::new(),
            warehouse_id: WarehouseId::new(),
            name: "A-01-01".to_string(),
        };

        assert!(!catalog.product_exists(product_id));
        assert!(catalog.location(location.id).is_none());

        catalog.add_product(product_id);
        catalog.add_location(location.clone());

        assert!(catalog.product_exists(product_id));
        assert_eq!(catalog.location(location.id), Some(location));
    }
}
