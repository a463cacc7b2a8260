use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stocktrail_core::ProductId;
use stocktrail_ledger::{MovementRecord, StockKey, StockRecord};

use super::query::{MovementFilter, MovementQuery, MovementQueryResult, Pagination};
use super::r#trait::{LedgerStore, LedgerStoreError, LedgerWrite, validate_batch};

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance. Records and the
/// journal live behind one lock, so a commit is atomic across both.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<StockKey, StockRecord>,
    journal: Vec<MovementRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the full journal in application order.
    pub fn journal(&self) -> Vec<MovementRecord> {
        match self.inner.read() {
            Ok(inner) => inner.journal.clone(),
            Err(_) => vec![],
        }
    }
}

impl LedgerStore for InMemoryLedger {
    fn get_or_create(
        &self,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, LedgerStoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(inner
            .records
            .entry(key)
            .or_insert_with(|| StockRecord::empty(key, at))
            .clone())
    }

    fn get(&self, key: StockKey) -> Result<Option<StockRecord>, LedgerStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        Ok(inner.records.get(&key).cloned())
    }

    fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        let mut records: Vec<StockRecord> = inner
            .records
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();

        // Deterministic order for callers.
        records.sort_by_key(|r| *r.location_id.as_uuid().as_bytes());
        Ok(records)
    }

    fn commit(&self, writes: Vec<LedgerWrite>) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&writes)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        // Check every expectation before touching anything.
        for write in &writes {
            let record = inner
                .records
                .get(&write.key)
                .ok_or(LedgerStoreError::UnknownRecord(write.key))?;
            if record.quantity != write.expected_quantity {
                return Err(LedgerStoreError::Conflict {
                    key: write.key,
                    expected: write.expected_quantity,
                    current: record.quantity,
                });
            }
        }

        // All checks passed; apply the whole batch.
        let Inner { records, journal } = &mut *inner;
        let mut committed = Vec::with_capacity(writes.len());
        for write in writes {
            // Presence was checked above.
            if let Some(record) = records.get_mut(&write.key) {
                record.quantity = write.new_quantity;
                if let Some(unit_cost) = write.unit_cost {
                    record.unit_cost = unit_cost;
                }
                if let Some(batch_number) = write.batch_number {
                    record.batch_number = Some(batch_number);
                }
                if let Some(expiry_date) = write.expiry_date {
                    record.expiry_date = Some(expiry_date);
                }
                record.updated_at = write.movement.occurred_at;
            }
            journal.push(write.movement.clone());
            committed.push(write.movement);
        }

        Ok(committed)
    }
}

impl MovementQuery for InMemoryLedger {
    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementQueryResult, LedgerStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;

        let mut matching: Vec<&MovementRecord> =
            inner.journal.iter().filter(|m| filter.matches(m)).collect();
        matching.sort_by_key(|m| (m.occurred_at, *m.id.as_uuid().as_bytes()));

        let total = matching.len() as u64;
        let movements: Vec<MovementRecord> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);

        Ok(MovementQueryResult {
            movements,
            total,
            pagination,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocktrail_core::{LocationId, MovementId, UserId};
    use stocktrail_ledger::{MovementRequest, plan};

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), LocationId::new())
    }

    fn write_for(key: StockKey, on_hand: i64, delta_quantity: i64) -> LedgerWrite {
        let request = if delta_quantity >= 0 {
            MovementRequest::inbound(
                key.product_id,
                key.location_id,
                UserId::new(),
                delta_quantity,
                Utc::now(),
            )
        } else {
            MovementRequest::outbound(
                key.product_id,
                key.location_id,
                UserId::new(),
                -delta_quantity,
                Utc::now(),
            )
        };
        let planned = plan(on_hand, &request).unwrap();
        let movement = MovementRecord::from_plan(MovementId::new(), &request, planned);
        LedgerWrite {
            key,
            expected_quantity: planned.previous_quantity,
            new_quantity: planned.new_quantity,
            unit_cost: None,
            batch_number: None,
            expiry_date: None,
            movement,
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = InMemoryLedger::new();
        let key = test_key();
        let at = Utc::now();

        let first = store.get_or_create(key, at).unwrap();
        let second = store.get_or_create(key, at).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.quantity, 0);
    }

    #[test]
    fn commit_updates_record_and_journal_together() {
        let store = InMemoryLedger::new();
        let key = test_key();
        store.get_or_create(key, Utc::now()).unwrap();

        let committed = store.commit(vec![write_for(key, 0, 7)]).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(store.get(key).unwrap().unwrap().quantity, 7);
        assert_eq!(store.journal().len(), 1);
        assert_eq!(store.journal()[0].new_quantity, 7);
    }

    #[test]
    fn stale_expectation_conflicts_and_writes_nothing() {
        let store = InMemoryLedger::new();
        let key = test_key();
        store.get_or_create(key, Utc::now()).unwrap();
        store.commit(vec![write_for(key, 0, 5)]).unwrap();

        // Built against on-hand 0, but the record is now at 5.
        let err = store.commit(vec![write_for(key, 0, 3)]).unwrap_err();
        match err {
            LedgerStoreError::Conflict {
                expected, current, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(current, 5);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.get(key).unwrap().unwrap().quantity, 5);
        assert_eq!(store.journal().len(), 1);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryLedger::new();
        let key_a = test_key();
        let key_b = test_key();
        store.get_or_create(key_a, Utc::now()).unwrap();
        store.get_or_create(key_b, Utc::now()).unwrap();
        store.commit(vec![write_for(key_b, 0, 2)]).unwrap();

        // First write is fine; second was planned against a stale quantity.
        let err = store
            .commit(vec![write_for(key_a, 0, 4), write_for(key_b, 0, 4)])
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::Conflict { .. }));

        // Neither write landed.
        assert_eq!(store.get(key_a).unwrap().unwrap().quantity, 0);
        assert_eq!(store.get(key_b).unwrap().unwrap().quantity, 2);
        assert_eq!(store.journal().len(), 1);
    }

    #[test]
    fn duplicate_keys_in_one_batch_are_rejected() {
        let store = InMemoryLedger::new();
        let key = test_key();
        store.get_or_create(key, Utc::now()).unwrap();

        let err = store
            .commit(vec![write_for(key, 0, 1), write_for(key, 1, 1)])
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::InvalidWrite(_)));
        assert_eq!(store.journal().len(), 0);
    }

    #[test]
    fn inconsistent_movement_is_rejected() {
        let store = InMemoryLedger::new();
        let key = test_key();
        store.get_or_create(key, Utc::now()).unwrap();

        let mut write = write_for(key, 0, 3);
        write.movement.new_quantity = 99;
        let err = store.commit(vec![write]).unwrap_err();
        assert!(matches!(err, LedgerStoreError::InvalidWrite(_)));
        assert_eq!(store.journal().len(), 0);
    }

    #[test]
    fn unknown_record_is_rejected() {
        let store = InMemoryLedger::new();
        let err = store.commit(vec![write_for(test_key(), 0, 1)]).unwrap_err();
        assert!(matches!(err, LedgerStoreError::UnknownRecord(_)));
    }
}
