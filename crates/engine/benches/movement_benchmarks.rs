use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stocktrail_core::{LocationId, ProductId, UserId, WarehouseId};
use stocktrail_engine::batch::BatchProcessor;
use stocktrail_engine::catalog::{InMemoryCatalog, LocationInfo};
use stocktrail_engine::engine::MovementEngine;
use stocktrail_engine::ledger_store::InMemoryLedger;
use stocktrail_ledger::{MovementRequest, StockKey};

/// Naive read-modify-write store: direct quantity updates, no journal, no
/// compare-and-set. The race-prone pattern the ledger engine replaces;
/// benchmarked as the baseline.
#[derive(Debug, Clone)]
struct NaiveStockStore {
    inner: Arc<RwLock<HashMap<StockKey, i64>>>,
}

impl NaiveStockStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn adjust(&self, key: StockKey, delta: i64) -> Result<i64, ()> {
        let mut map = self.inner.write().unwrap();
        let quantity = map.entry(key).or_insert(0);
        let new_quantity = *quantity + delta;
        if new_quantity < 0 {
            return Err(());
        }
        *quantity = new_quantity;
        Ok(new_quantity)
    }
}

fn setup_engine() -> (
    MovementEngine<Arc<InMemoryLedger>, Arc<InMemoryCatalog>>,
    ProductId,
    LocationId,
    UserId,
) {
    let store = Arc::new(InMemoryLedger::new());
    let catalog = Arc::new(InMemoryCatalog::new());

    let product_id = ProductId::new();
    let location_id = LocationId::new();
    catalog.add_product(product_id);
    catalog.add_location(LocationInfo {
        id: location_id,
        warehouse_id: WarehouseId::new(),
        name: "BENCH-01".to_string(),
    });

    let engine = MovementEngine::new(store, catalog);
    (engine, product_id, location_id, UserId::new())
}

fn bench_movement_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement_latency");
    group.sample_size(1000);

    // Baseline: direct map update, no audit trail, no conflict detection.
    group.bench_function("naive_read_modify_write", |b| {
        let store = NaiveStockStore::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());
        b.iter(|| {
            store.adjust(key, black_box(1)).unwrap();
        });
    });

    // Full pipeline: validate, catalog check, plan, CAS commit, journal.
    group.bench_function("engine_apply_movement", |b| {
        let (engine, product_id, location_id, actor_id) = setup_engine();
        b.iter(|| {
            let request = MovementRequest::inbound(
                product_id,
                location_id,
                actor_id,
                black_box(1),
                Utc::now(),
            );
            engine.apply_movement(&request).unwrap();
        });
    });

    group.finish();
}

fn bench_batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_throughput");

    for batch_size in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("process_batch", batch_size),
            batch_size,
            |b, &size| {
                let (engine, product_id, location_id, actor_id) = setup_engine();
                let processor = BatchProcessor::new(engine);

                b.iter(|| {
                    let requests: Vec<MovementRequest> = (0..size)
                        .map(|_| {
                            MovementRequest::inbound(
                                product_id,
                                location_id,
                                actor_id,
                                1,
                                Utc::now(),
                            )
                        })
                        .collect();

                    let report = processor.process_batch(&requests);
                    assert_eq!(report.summary.failed, 0);
                    black_box(report);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_movement_latency, bench_batch_throughput);
criterion_main!(benches);
