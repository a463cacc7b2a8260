//! Stock ledger storage boundary.
//!
//! This module defines the infrastructure-facing abstraction over the pair of
//! stores the ledger is made of (keyed stock records plus the append-only
//! movement journal) without making any storage assumptions. The two sides
//! are kept causally consistent by a transactional `commit`.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use query::{MovementFilter, MovementQuery, MovementQueryResult, Pagination};
pub use r#trait::{LedgerStore, LedgerStoreError, LedgerWrite};
