//! Postgres-backed store.
//!
//! Every [`StoreTx`] wraps a sqlx transaction. Row locks are `SELECT ... FOR UPDATE`,
//! and the wait is bounded per transaction with `SET LOCAL lock_timeout`.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` unique violation | `DuplicateKey` | concurrent idempotency key, second order for a hold |
//! | `55P03` lock not available | `LockTimeout` | `lock_timeout` elapsed waiting for a row lock |
//! | `40P01` / `40001` | `Contention` | deadlock or serialization failure |
//! | `23514` check violation | `Backend` | stock would go negative |
//! | anything else | `Backend` | connection, IO, protocol |
//!
//! Timestamps are always bound from the caller's clock rather than `NOW()`, so expiry
//! decisions agree with the service layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use flashsale_core::{HoldId, MetricsEventId, OrderId, ProductId};
use flashsale_inventory::{
    Hold, IdempotencyRecord, IdempotencyStatus, MetricsEvent, Order, OrderStatus, Product,
    StockSnapshot,
};

use super::{Store, StoreError, StoreTx};

const MIGRATION: &str = include_str!("../../migrations/0001_flash_sale.sql");

const PRODUCT_COLUMNS: &str = "id, name, price, stock, created_at, updated_at";
const HOLD_COLUMNS: &str = "id, product_id, quantity, created_at, expires_at, used_at, released_at";
const ORDER_COLUMNS: &str =
    "id, product_id, hold_id, quantity, total_price, status, created_at, updated_at";
const IDEMPOTENCY_COLUMNS: &str = "key, order_id, status, payload, created_at, updated_at";

/// Sums of open holds and pending orders for `$1` as of `$2`.
const RESERVED_SUMS: &str = r#"
    COALESCE((
        SELECT SUM(h.quantity) FROM holds h
        WHERE h.product_id = $1
          AND h.expires_at > $2
          AND h.used_at IS NULL
          AND h.released_at IS NULL
    ), 0)::BIGINT AS held,
    COALESCE((
        SELECT SUM(o.quantity) FROM orders o
        WHERE o.product_id = $1 AND o.status = 'pending'
    ), 0)::BIGINT AS pending
"#;

/// Postgres store sharing one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout,
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresTx { tx }))
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_product", e))?;
        row.as_ref().map(decode::<ProductRow, Product>).transpose()
    }

    async fn stock_snapshot(
        &self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT p.stock, {RESERVED_SUMS} FROM products p WHERE p.id = $1"
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_snapshot", e))?;

        row.as_ref()
            .map(|row| {
                let committed: i64 = get(row, "stock")?;
                Ok(StockSnapshot::new(
                    committed,
                    get(row, "held")?,
                    get(row, "pending")?,
                ))
            })
            .transpose()
    }

    async fn hold(&self, id: HoldId) -> Result<Option<Hold>, StoreError> {
        let row = sqlx::query(&format!("SELECT {HOLD_COLUMNS} FROM holds WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_hold", e))?;
        row.as_ref().map(decode::<HoldRow, Hold>).transpose()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_order", e))?;
        row.as_ref().map(decode::<OrderRow, Order>).transpose()
    }

    async fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {IDEMPOTENCY_COLUMNS} FROM idempotency_records WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_idempotency_record", e))?;
        row.as_ref()
            .map(decode::<IdempotencyRow, IdempotencyRecord>)
            .transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(to_i64(product.price, "product.price")?)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn metrics_events(&self, limit: Option<usize>) -> Result<Vec<MetricsEvent>, StoreError> {
        // LIMIT NULL is LIMIT ALL.
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        let rows = sqlx::query(
            r#"
            SELECT id, type, payload, created_at
            FROM metrics_events
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_metrics_events", e))?;

        rows.iter()
            .map(decode::<MetricsEventRow, MetricsEvent>)
            .collect()
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx {
    async fn fetch_hold(&mut self, id: HoldId, lock: bool) -> Result<Option<Hold>, StoreError> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {HOLD_COLUMNS} FROM holds WHERE id = $1{suffix}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_hold", e))?;
        row.as_ref().map(decode::<HoldRow, Hold>).transpose()
    }

    async fn fetch_order(&mut self, id: OrderId, lock: bool) -> Result<Option<Order>, StoreError> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{suffix}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?;
        row.as_ref().map(decode::<OrderRow, Order>).transpose()
    }

    async fn fetch_product(
        &mut self,
        id: ProductId,
        lock: bool,
    ) -> Result<Option<Product>, StoreError> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{suffix}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_product", e))?;
        row.as_ref().map(decode::<ProductRow, Product>).transpose()
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.fetch_product(id, true).await
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.fetch_product(id, false).await
    }

    async fn stock_snapshot(
        &mut self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<StockSnapshot, StoreError> {
        let row = sqlx::query(&format!("SELECT {RESERVED_SUMS}"))
            .bind(product.id.as_uuid())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("stock_snapshot", e))?;

        Ok(StockSnapshot::new(
            product.stock,
            get(&row, "held")?,
            get(&row, "pending")?,
        ))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn adjust_product_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Take the row lock first so the lock order stays explicit.
        if self.fetch_product(id, true).await?.is_none() {
            return Err(StoreError::MissingRow(format!("product:{id}")));
        }

        let result = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(delta)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_product_stock", e))?;

        expect_one_row(result.rows_affected(), || format!("product:{id}"))
    }

    async fn insert_hold(&mut self, hold: &Hold) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO holds (id, product_id, quantity, created_at, expires_at, used_at, released_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(hold.id.as_uuid())
        .bind(hold.product_id.as_uuid())
        .bind(i64::from(hold.quantity))
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .bind(hold.used_at)
        .bind(hold.released_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_hold", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(hold_id = %id), err)]
    async fn lock_hold(&mut self, id: HoldId) -> Result<Option<Hold>, StoreError> {
        self.fetch_hold(id, true).await
    }

    #[instrument(skip(self), err)]
    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {HOLD_COLUMNS} FROM holds
            WHERE expires_at <= $1
              AND used_at IS NULL
              AND released_at IS NULL
            ORDER BY id
            FOR UPDATE
            "#
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_expired_holds", e))?;

        rows.iter().map(decode::<HoldRow, Hold>).collect()
    }

    async fn save_hold(&mut self, hold: &Hold) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE holds SET used_at = $2, released_at = $3 WHERE id = $1")
            .bind(hold.id.as_uuid())
            .bind(hold.used_at)
            .bind(hold.released_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_hold", e))?;

        expect_one_row(result.rows_affected(), || format!("hold:{}", hold.id))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, product_id, hold_id, quantity, total_price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.product_id.as_uuid())
        .bind(order.hold_id.as_uuid())
        .bind(i64::from(order.quantity))
        .bind(to_i64(order.total_price, "order.total_price")?)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order(id, false).await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.fetch_order(id, true).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_order", e))?;

        expect_one_row(result.rows_affected(), || format!("order:{}", order.id))
    }

    async fn idempotency_record(
        &mut self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {IDEMPOTENCY_COLUMNS} FROM idempotency_records WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_idempotency_record", e))?;
        row.as_ref()
            .map(decode::<IdempotencyRow, IdempotencyRecord>)
            .transpose()
    }

    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, order_id, status, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.key)
        .bind(record.order_id.as_uuid())
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_idempotency_record", e))?;
        Ok(())
    }

    async fn save_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_records
            SET order_id = $2, status = $3, updated_at = $4
            WHERE key = $1
            "#,
        )
        .bind(&record.key)
        .bind(record.order_id.as_uuid())
        .bind(record.status.as_str())
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_idempotency_record", e))?;

        expect_one_row(result.rows_affected(), || {
            format!("idempotency_record:{}", record.key)
        })
    }

    async fn record_metric(&mut self, event: &MetricsEvent) -> Result<(), StoreError> {
        let payload = event
            .payload()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO metrics_events (id, type, payload, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.id.as_uuid())
        .bind(event.event_type())
        .bind(payload)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("record_metric", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn expect_one_row(affected: u64, what: impl FnOnce() -> String) -> Result<(), StoreError> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::MissingRow(what()))
    }
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

/// Decode a raw row via its row type, then convert into the domain type.
fn decode<R, T>(row: &PgRow) -> Result<T, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    let raw = R::from_row(row).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    T::try_from(raw)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::DuplicateKey(msg),
                Some("55P03") => StoreError::LockTimeout(msg),
                Some("40P01") | Some("40001") => StoreError::Contention(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Contention(format!("connection pool timed out in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: i64,
    stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            price: to_u64(row.price, "products.price")?,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct HoldRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for HoldRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(HoldRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            used_at: row.try_get("used_at")?,
            released_at: row.try_get("released_at")?,
        })
    }
}

impl TryFrom<HoldRow> for Hold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(Hold {
            id: HoldId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: to_u32(row.quantity, "holds.quantity")?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
            released_at: row.released_at,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    product_id: Uuid,
    hold_id: Uuid,
    quantity: i64,
    total_price: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            hold_id: row.try_get("hold_id")?,
            quantity: row.try_get("quantity")?,
            total_price: row.try_get("total_price")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e: flashsale_core::DomainError| StoreError::Corrupt(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            hold_id: HoldId::from_uuid(row.hold_id),
            quantity: to_u32(row.quantity, "orders.quantity")?,
            total_price: to_u64(row.total_price, "orders.total_price")?,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct IdempotencyRow {
    key: String,
    order_id: Uuid,
    status: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for IdempotencyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(IdempotencyRow {
            key: row.try_get("key")?,
            order_id: row.try_get("order_id")?,
            status: row.try_get("status")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = StoreError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        let status: IdempotencyStatus = row
            .status
            .parse()
            .map_err(|e: flashsale_core::DomainError| StoreError::Corrupt(e.to_string()))?;

        Ok(IdempotencyRecord {
            key: row.key,
            order_id: OrderId::from_uuid(row.order_id),
            status,
            payload: row.payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct MetricsEventRow {
    id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MetricsEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MetricsEventRow {
            id: row.try_get("id")?,
            event_type: row.try_get("type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MetricsEventRow> for MetricsEvent {
    type Error = StoreError;

    fn try_from(row: MetricsEventRow) -> Result<Self, Self::Error> {
        MetricsEvent::from_parts(
            MetricsEventId::from_uuid(row.id),
            &row.event_type,
            row.payload,
            row.created_at,
        )
        .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}
