//! Transactional storage boundary.
//!
//! The services in this crate never talk to a database directly. They open a
//! [`StoreTx`], take exclusive row locks through it, stage their writes, and commit.
//! Dropping a transaction without committing rolls it back.
//!
//! ## Row locks
//!
//! `lock_*` methods acquire an exclusive lock on one record for the lifetime of the
//! transaction, serializing every other transaction that asks for the same lock. This is
//! the only correctness mechanism for concurrent stock accounting:
//!
//! - **product row**: serializes hold creation per product
//! - **hold row**: serializes order creation per hold
//! - **order row**: serializes payment settlement per order
//!
//! Waits are bounded by the store's lock timeout and surface as
//! [`StoreError::LockTimeout`].
//!
//! ## Implementations
//!
//! - [`InMemoryStore`]: per-row async mutexes with write staging (tests/dev)
//! - [`PostgresStore`]: `SELECT ... FOR UPDATE` inside a sqlx transaction

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use flashsale_core::{HoldId, OrderId, ProductId};
use flashsale_inventory::{Hold, IdempotencyRecord, MetricsEvent, Order, Product, StockSnapshot};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Storage operation error.
///
/// These are infrastructure errors as opposed to domain errors. `LockTimeout`,
/// `DuplicateKey` and `Contention` are retryable by the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the lock timeout.
    #[error("lock timeout on {0}")]
    LockTimeout(String),

    /// A unique constraint rejected an insert (e.g. a concurrent idempotency key).
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The backend aborted the transaction to resolve contention (deadlock, serialization).
    #[error("contention: {0}")]
    Contention(String),

    /// A row the transaction depends on vanished.
    #[error("missing row: {0}")]
    MissingRow(String),

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Any other backend failure (connection, IO, protocol).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout(_) | StoreError::DuplicateKey(_) | StoreError::Contention(_)
        )
    }
}

/// Connection-level access: non-locking reads and transaction creation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Stock inputs for a product as of `now`, without taking any lock.
    async fn stock_snapshot(
        &self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError>;

    async fn hold(&self, id: HoldId) -> Result<Option<Hold>, StoreError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Catalog seeding; products are otherwise managed outside this core.
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Most recent metrics events first; every event when `limit` is `None`.
    async fn metrics_events(&self, limit: Option<usize>) -> Result<Vec<MetricsEvent>, StoreError>;
}

/// One unit of work. All writes become visible atomically on [`StoreTx::commit`].
#[async_trait]
pub trait StoreTx: Send {
    /// Lock and load a product row.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Load a product row without locking it.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Stock inputs for a product, read inside this transaction.
    async fn stock_snapshot(
        &mut self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<StockSnapshot, StoreError>;

    /// Decrement (or increment) committed stock. Takes the product row lock.
    async fn adjust_product_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_hold(&mut self, hold: &Hold) -> Result<(), StoreError>;

    async fn lock_hold(&mut self, id: HoldId) -> Result<Option<Hold>, StoreError>;

    /// Lock every hold that is past expiry and neither used nor released.
    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError>;

    /// Persist `used_at` / `released_at` of a locked hold.
    async fn save_hold(&mut self, hold: &Hold) -> Result<(), StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Look up an order without locking it; sees rows committed by other transactions.
    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Persist the status of a locked order.
    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn idempotency_record(
        &mut self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Insert a new record; [`StoreError::DuplicateKey`] if the key already exists.
    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError>;

    async fn save_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError>;

    async fn record_metric(&mut self, event: &MetricsEvent) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
