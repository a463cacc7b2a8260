//! Postgres-backed ledger store.
//!
//! Persistent implementation using PostgreSQL. The compare-and-set is a
//! conditional `UPDATE ... WHERE quantity = expected`; the quantity update
//! and the journal insert share one transaction, so a movement record never
//! exists without its quantity change (and vice versa). A `CHECK
//! (quantity >= 0)` constraint backs the non-negativity invariant at the
//! database level as well.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `LedgerStoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerStoreError | Scenario |
//! |------------|----------------------|------------------|----------|
//! | Database (check constraint violation) | `23514` | `InvalidWrite` | Write would make quantity negative |
//! | Database (unique violation) | `23505` | `InvalidWrite` | Duplicate movement id / record pair |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / RowNotFound / Other | N/A | `Storage` | Pool closed, network failures, etc. |
//!
//! A failed conditional update is not an SQLx error; it is detected from
//! `rows_affected` and reported as `Conflict` (or `UnknownRecord` when the
//! pair has no row at all).
//!
//! ## Schema
//!
//! Expects the following tables:
//!
//! ```sql
//! CREATE TABLE stock_records (
//!     product_id  uuid        NOT NULL,
//!     location_id uuid        NOT NULL,
//!     quantity    bigint      NOT NULL CHECK (quantity >= 0),
//!     unit_cost   bigint      NOT NULL DEFAULT 0,
//!     batch_number text,
//!     expiry_date date,
//!     created_at  timestamptz NOT NULL,
//!     updated_at  timestamptz NOT NULL,
//!     PRIMARY KEY (product_id, location_id)
//! );
//!
//! CREATE TABLE stock_movements (
//!     id                uuid        PRIMARY KEY,
//!     product_id        uuid        NOT NULL,
//!     location_id       uuid        NOT NULL,
//!     actor_id          uuid        NOT NULL,
//!     kind              text        NOT NULL,
//!     quantity          bigint      NOT NULL,
//!     previous_quantity bigint      NOT NULL,
//!     new_quantity      bigint      NOT NULL,
//!     notes             text,
//!     reference         text,
//!     occurred_at       timestamptz NOT NULL,
//!     recorded_at       timestamptz NOT NULL DEFAULT now()
//! );
//! ```
//!
//! ## Thread Safety
//!
//! `PostgresLedger` is `Send + Sync` and can be shared across threads. All
//! operations use the SQLx connection pool, which handles thread-safe
//! connection management.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use stocktrail_core::{LocationId, MovementId, ProductId, UserId};
use stocktrail_ledger::{MovementKind, MovementRecord, StockKey, StockRecord};

use super::query::{MovementFilter, MovementQuery, MovementQueryResult, Pagination};
use super::r#trait::{LedgerStore, LedgerStoreError, LedgerWrite, validate_batch};

/// Postgres-backed stock ledger.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    /// Create a new PostgresLedger with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Load the record for a pair, inserting an empty one if absent.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn get_or_create_record(
        &self,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_records (product_id, location_id, quantity, unit_cost, created_at, updated_at)
            VALUES ($1, $2, 0, 0, $3, $3)
            ON CONFLICT (product_id, location_id) DO NOTHING
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_or_create", e))?;

        let row = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity, unit_cost, batch_number, expiry_date, created_at, updated_at
            FROM stock_records
            WHERE product_id = $1 AND location_id = $2
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_or_create", e))?;

        record_from_row(&row)
    }

    /// Read a record without creating it.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn get_record(&self, key: StockKey) -> Result<Option<StockRecord>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity, unit_cost, batch_number, expiry_date, created_at, updated_at
            FROM stock_records
            WHERE product_id = $1 AND location_id = $2
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// All records for a product across locations.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn list_product_records(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity, unit_cost, batch_number, expiry_date, created_at, updated_at
            FROM stock_records
            WHERE product_id = $1
            ORDER BY location_id ASC
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_for_product", e))?;

        rows.iter().map(record_from_row).collect()
    }

    /// Apply a write batch atomically.
    ///
    /// One transaction spans the whole batch. Each write issues a conditional
    /// update; zero rows affected means the expectation is stale (another
    /// writer got there first) or the record is missing, and the transaction
    /// is rolled back either way.
    #[instrument(skip(self, writes), fields(write_count = writes.len()), err)]
    pub async fn commit_writes(
        &self,
        writes: Vec<LedgerWrite>,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&writes)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed = Vec::with_capacity(writes.len());
        for write in writes {
            let result = sqlx::query(
                r#"
                UPDATE stock_records
                SET quantity = $3,
                    unit_cost = COALESCE($4, unit_cost),
                    batch_number = COALESCE($5, batch_number),
                    expiry_date = COALESCE($6, expiry_date),
                    updated_at = $7
                WHERE product_id = $1 AND location_id = $2 AND quantity = $8
                "#,
            )
            .bind(write.key.product_id.as_uuid())
            .bind(write.key.location_id.as_uuid())
            .bind(write.new_quantity)
            .bind(write.unit_cost)
            .bind(&write.batch_number)
            .bind(write.expiry_date)
            .bind(write.movement.occurred_at)
            .bind(write.expected_quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_stock_record", e))?;

            if result.rows_affected() != 1 {
                // Stale expectation or missing record; find out which before
                // rolling back.
                let current = sqlx::query(
                    "SELECT quantity FROM stock_records WHERE product_id = $1 AND location_id = $2",
                )
                .bind(write.key.product_id.as_uuid())
                .bind(write.key.location_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("read_current_quantity", e))?;

                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;

                return match current {
                    Some(row) => {
                        let quantity: i64 = row
                            .try_get("quantity")
                            .map_err(|e| LedgerStoreError::Storage(format!(
                                "failed to read quantity: {e}"
                            )))?;
                        Err(LedgerStoreError::Conflict {
                            key: write.key,
                            expected: write.expected_quantity,
                            current: quantity,
                        })
                    }
                    None => Err(LedgerStoreError::UnknownRecord(write.key)),
                };
            }

            sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id,
                    product_id,
                    location_id,
                    actor_id,
                    kind,
                    quantity,
                    previous_quantity,
                    new_quantity,
                    notes,
                    reference,
                    occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(write.movement.id.as_uuid())
            .bind(write.movement.product_id.as_uuid())
            .bind(write.movement.location_id.as_uuid())
            .bind(write.movement.actor_id.as_uuid())
            .bind(write.movement.kind.as_str())
            .bind(write.movement.quantity)
            .bind(write.movement.previous_quantity)
            .bind(write.movement.new_quantity)
            .bind(&write.movement.notes)
            .bind(&write.movement.reference)
            .bind(write.movement.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_movement", e))?;

            committed.push(write.movement);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }

    /// Query the movement journal with filters and pagination.
    #[instrument(skip(self, filter), err)]
    pub async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementQueryResult, LedgerStoreError> {
        let product_param = filter.product_id.map(|id| *id.as_uuid());
        let location_param = filter.location_id.map(|id| *id.as_uuid());
        let actor_param = filter.actor_id.map(|id| *id.as_uuid());
        let kind_param = filter.kind.map(|k| k.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
                AND ($2::uuid IS NULL OR location_id = $2)
                AND ($3::uuid IS NULL OR actor_id = $3)
                AND ($4::text IS NULL OR kind = $4)
                AND ($5::timestamptz IS NULL OR occurred_at >= $5)
                AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            "#,
        )
        .bind(product_param)
        .bind(location_param)
        .bind(actor_param)
        .bind(kind_param)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| LedgerStoreError::Storage(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(
            r#"
            SELECT id, product_id, location_id, actor_id, kind, quantity,
                   previous_quantity, new_quantity, notes, reference, occurred_at
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
                AND ($2::uuid IS NULL OR location_id = $2)
                AND ($3::uuid IS NULL OR actor_id = $3)
                AND ($4::text IS NULL OR kind = $4)
                AND ($5::timestamptz IS NULL OR occurred_at >= $5)
                AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            ORDER BY occurred_at ASC, id ASC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(product_param)
        .bind(location_param)
        .bind(actor_param)
        .bind(kind_param)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = total > i64::from(pagination.offset) + i64::from(pagination.limit);

        Ok(MovementQueryResult {
            movements,
            total: total as u64,
            pagination,
            has_more,
        })
    }

    fn runtime_handle() -> Result<tokio::runtime::Handle, LedgerStoreError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerStoreError::Storage(
                "PostgresLedger requires an async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })
    }
}

// The LedgerStore trait is synchronous, but Postgres operations require
// async. tokio::runtime::Handle bridges the two when called from within a
// tokio runtime (e.g. from HTTP handlers).

impl LedgerStore for PostgresLedger {
    fn get_or_create(
        &self,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Result<StockRecord, LedgerStoreError> {
        Self::runtime_handle()?.block_on(self.get_or_create_record(key, at))
    }

    fn get(&self, key: StockKey) -> Result<Option<StockRecord>, LedgerStoreError> {
        Self::runtime_handle()?.block_on(self.get_record(key))
    }

    fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        Self::runtime_handle()?.block_on(self.list_product_records(product_id))
    }

    fn commit(&self, writes: Vec<LedgerWrite>) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        Self::runtime_handle()?.block_on(self.commit_writes(writes))
    }
}

impl MovementQuery for PostgresLedger {
    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementQueryResult, LedgerStoreError> {
        Self::runtime_handle()?.block_on(self.query_movements(filter, pagination))
    }
}

/// Map SQLx errors to LedgerStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    // Check constraint violation (quantity >= 0)
                    "23514" => LedgerStoreError::InvalidWrite(msg),
                    // Unique violation (duplicate movement id / record pair)
                    "23505" => LedgerStoreError::InvalidWrite(msg),
                    _ => LedgerStoreError::Storage(msg),
                }
            } else {
                LedgerStoreError::Storage(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => LedgerStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<StockRecord, LedgerStoreError> {
    let read = |e: sqlx::Error| {
        LedgerStoreError::Storage(format!("failed to deserialize stock record row: {e}"))
    };

    Ok(StockRecord {
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(read)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(read)?),
        quantity: row.try_get("quantity").map_err(read)?,
        unit_cost: row.try_get("unit_cost").map_err(read)?,
        batch_number: row.try_get("batch_number").map_err(read)?,
        expiry_date: row.try_get("expiry_date").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
    })
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> Result<MovementRecord, LedgerStoreError> {
    let read = |e: sqlx::Error| {
        LedgerStoreError::Storage(format!("failed to deserialize movement row: {e}"))
    };

    let kind_text: String = row.try_get("kind").map_err(read)?;
    let kind: MovementKind = kind_text
        .parse()
        .map_err(|_| LedgerStoreError::Storage(format!("unknown movement kind: {kind_text}")))?;

    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id").map_err(read)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(read)?),
        location_id: LocationId::from_uuid(row.try_get("location_id").map_err(read)?),
        actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(read)?),
        kind,
        quantity: row.try_get("quantity").map_err(read)?,
        previous_quantity: row.try_get("previous_quantity").map_err(read)?,
        new_quantity: row.try_get("new_quantity").map_err(read)?,
        notes: row.try_get("notes").map_err(read)?,
        reference: row.try_get("reference").map_err(read)?,
        occurred_at: row.try_get("occurred_at").map_err(read)?,
    })
}
