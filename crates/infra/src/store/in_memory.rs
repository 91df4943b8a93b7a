use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use flashsale_core::{HoldId, OrderId, ProductId};
use flashsale_inventory::{Hold, IdempotencyRecord, MetricsEvent, Order, Product, StockSnapshot};

use super::{Store, StoreError, StoreTx};

/// Row-lock wait bound used by [`InMemoryStore::new`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Hold(HoldId),
    Order(OrderId),
}

impl core::fmt::Display for RowKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RowKey::Product(id) => write!(f, "product:{id}"),
            RowKey::Hold(id) => write!(f, "hold:{id}"),
            RowKey::Order(id) => write!(f, "order:{id}"),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    holds: HashMap<HoldId, Hold>,
    orders: HashMap<OrderId, Order>,
    idempotency: HashMap<String, IdempotencyRecord>,
    metrics: Vec<MetricsEvent>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    /// Idempotency keys inserted by transactions that have not finished yet.
    inflight_keys: Mutex<HashSet<String>>,
    lock_timeout: Duration,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn row_lock(&self, key: RowKey) -> Result<Arc<RowMutex<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(locks.entry(key).or_default().clone())
    }
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Row locks are per-record async mutexes held until the
/// owning transaction commits or is dropped. Writes are staged inside the transaction
/// and applied atomically on commit, so a dropped transaction leaves no trace.
/// Reads outside a transaction see committed data only.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                inflight_keys: Mutex::new(HashSet::new()),
                lock_timeout,
            }),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            staged: Staged::default(),
            claimed_keys: Vec::new(),
        }))
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.shared.read()?.products.get(&id).cloned())
    }

    async fn stock_snapshot(
        &self,
        id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError> {
        let tables = self.shared.read()?;
        let Some(product) = tables.products.get(&id) else {
            return Ok(None);
        };

        Ok(Some(StockSnapshot::from_rows(
            product.stock,
            tables.holds.values().filter(|h| h.product_id == id),
            tables.orders.values().filter(|o| o.product_id == id),
            now,
        )))
    }

    async fn hold(&self, id: HoldId) -> Result<Option<Hold>, StoreError> {
        Ok(self.shared.read()?.holds.get(&id).cloned())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.shared.read()?.orders.get(&id).cloned())
    }

    async fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.shared.read()?.idempotency.get(key).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tables = self.shared.write()?;
        if tables.products.contains_key(&product.id) {
            return Err(StoreError::DuplicateKey(format!("product:{}", product.id)));
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn metrics_events(&self, limit: Option<usize>) -> Result<Vec<MetricsEvent>, StoreError> {
        let tables = self.shared.read()?;
        let limit = limit.unwrap_or(tables.metrics.len());
        Ok(tables.metrics.iter().rev().take(limit).cloned().collect())
    }
}

/// Writes buffered until commit.
#[derive(Debug, Default)]
struct Staged {
    holds: HashMap<HoldId, Hold>,
    orders: HashMap<OrderId, Order>,
    /// Stock delta and new `updated_at` per product.
    stock: HashMap<ProductId, (i64, DateTime<Utc>)>,
    idempotency: HashMap<String, IdempotencyRecord>,
    metrics: Vec<MetricsEvent>,
}

#[derive(Debug)]
struct InMemoryTx {
    shared: Arc<Shared>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
    claimed_keys: Vec<String>,
}

impl InMemoryTx {
    async fn acquire(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        let row = self.shared.row_lock(key)?;
        let guard = tokio::time::timeout(self.shared.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(key.to_string()))?;
        self.guards.insert(key, guard);
        Ok(())
    }

    fn product_view(&self, tables: &Tables, id: ProductId) -> Option<Product> {
        let mut product = tables.products.get(&id).cloned()?;
        if let Some((delta, at)) = self.staged.stock.get(&id) {
            product.stock += delta;
            product.updated_at = *at;
        }
        Some(product)
    }

    fn hold_view(&self, tables: &Tables, id: HoldId) -> Option<Hold> {
        self.staged
            .holds
            .get(&id)
            .or_else(|| tables.holds.get(&id))
            .cloned()
    }

    fn order_view(&self, tables: &Tables, id: OrderId) -> Option<Order> {
        self.staged
            .orders
            .get(&id)
            .or_else(|| tables.orders.get(&id))
            .cloned()
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if self.claimed_keys.is_empty() {
            return;
        }
        let mut inflight = self
            .shared
            .inflight_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in &self.claimed_keys {
            inflight.remove(key);
        }
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.acquire(RowKey::Product(id)).await?;
        let tables = self.shared.read()?;
        Ok(self.product_view(&tables, id))
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let tables = self.shared.read()?;
        Ok(self.product_view(&tables, id))
    }

    async fn stock_snapshot(
        &mut self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<StockSnapshot, StoreError> {
        let tables = self.shared.read()?;

        let mut holds: HashMap<HoldId, &Hold> = tables
            .holds
            .values()
            .filter(|h| h.product_id == product.id)
            .map(|h| (h.id, h))
            .collect();
        holds.extend(
            self.staged
                .holds
                .values()
                .filter(|h| h.product_id == product.id)
                .map(|h| (h.id, h)),
        );

        let mut orders: HashMap<OrderId, &Order> = tables
            .orders
            .values()
            .filter(|o| o.product_id == product.id)
            .map(|o| (o.id, o))
            .collect();
        orders.extend(
            self.staged
                .orders
                .values()
                .filter(|o| o.product_id == product.id)
                .map(|o| (o.id, o)),
        );

        Ok(StockSnapshot::from_rows(
            product.stock,
            holds.into_values(),
            orders.into_values(),
            now,
        ))
    }

    async fn adjust_product_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.acquire(RowKey::Product(id)).await?;

        let current = {
            let tables = self.shared.read()?;
            self.product_view(&tables, id)
                .ok_or_else(|| StoreError::MissingRow(format!("product:{id}")))?
        };
        if current.stock + delta < 0 {
            return Err(StoreError::Backend(format!(
                "stock check violated for product:{id}"
            )));
        }

        let entry = self.staged.stock.entry(id).or_insert((0, now));
        entry.0 += delta;
        entry.1 = now;
        Ok(())
    }

    async fn insert_hold(&mut self, hold: &Hold) -> Result<(), StoreError> {
        let exists = self.shared.read()?.holds.contains_key(&hold.id)
            || self.staged.holds.contains_key(&hold.id);
        if exists {
            return Err(StoreError::DuplicateKey(format!("hold:{}", hold.id)));
        }
        self.staged.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn lock_hold(&mut self, id: HoldId) -> Result<Option<Hold>, StoreError> {
        self.acquire(RowKey::Hold(id)).await?;
        let tables = self.shared.read()?;
        Ok(self.hold_view(&tables, id))
    }

    async fn lock_expired_holds(&mut self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
        let mut candidates: Vec<HoldId> = {
            let tables = self.shared.read()?;
            tables
                .holds
                .values()
                .filter(|h| h.is_expired(now) && !h.is_used() && !h.is_released())
                .map(|h| h.id)
                .collect()
        };
        candidates.sort();

        for id in &candidates {
            self.acquire(RowKey::Hold(*id)).await?;
        }

        // Re-check under the locks: a concurrent transaction may have consumed or
        // released a candidate before we got to it.
        let tables = self.shared.read()?;
        Ok(candidates
            .into_iter()
            .filter_map(|id| self.hold_view(&tables, id))
            .filter(|h| h.is_expired(now) && !h.is_used() && !h.is_released())
            .collect())
    }

    async fn save_hold(&mut self, hold: &Hold) -> Result<(), StoreError> {
        self.staged.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let tables = self.shared.read()?;
        let clashes = |o: &Order| o.id == order.id || o.hold_id == order.hold_id;
        if tables.orders.values().any(clashes) || self.staged.orders.values().any(clashes) {
            return Err(StoreError::DuplicateKey(format!("order for hold:{}", order.hold_id)));
        }
        drop(tables);

        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let tables = self.shared.read()?;
        Ok(self.order_view(&tables, id))
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.acquire(RowKey::Order(id)).await?;
        let tables = self.shared.read()?;
        Ok(self.order_view(&tables, id))
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn idempotency_record(
        &mut self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        if let Some(record) = self.staged.idempotency.get(key) {
            return Ok(Some(record.clone()));
        }
        Ok(self.shared.read()?.idempotency.get(key).cloned())
    }

    async fn insert_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        let committed = self.shared.read()?.idempotency.contains_key(&record.key);
        if committed || self.staged.idempotency.contains_key(&record.key) {
            return Err(StoreError::DuplicateKey(record.key.clone()));
        }

        let claimed = self
            .shared
            .inflight_keys
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .insert(record.key.clone());
        if !claimed {
            return Err(StoreError::DuplicateKey(record.key.clone()));
        }
        self.claimed_keys.push(record.key.clone());

        self.staged
            .idempotency
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn save_idempotency_record(
        &mut self,
        record: &IdempotencyRecord,
    ) -> Result<(), StoreError> {
        self.staged
            .idempotency
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn record_metric(&mut self, event: &MetricsEvent) -> Result<(), StoreError> {
        self.staged.metrics.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);

        {
            let mut tables = this.shared.write()?;

            if let Some(missing) = staged
                .stock
                .keys()
                .find(|id| !tables.products.contains_key(id))
            {
                return Err(StoreError::MissingRow(format!("product:{missing}")));
            }

            for (id, (delta, at)) in staged.stock {
                if let Some(product) = tables.products.get_mut(&id) {
                    product.stock += delta;
                    product.updated_at = at;
                }
            }
            tables.holds.extend(staged.holds);
            tables.orders.extend(staged.orders);
            tables.idempotency.extend(staged.idempotency);
            tables.metrics.extend(staged.metrics);
        }

        // Dropping the transaction releases row locks and in-flight keys only after
        // the writes are visible.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use flashsale_inventory::{IdempotencyRecord, MetricsEventKind};
    use serde_json::json;

    async fn seeded(stock: i64) -> (InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let product = Product::new(ProductId::new(), "Item", 100, stock, Utc::now()).unwrap();
        store.insert_product(&product).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let (store, product) = seeded(5).await;
        let now = Utc::now();
        let hold = Hold::new(HoldId::new(), product.id, 1, now, ChronoDuration::minutes(2)).unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_hold(&hold).await.unwrap();
            tx.record_metric(&MetricsEvent::new(
                MetricsEventKind::HoldsBatchReleased { count: 1 },
                now,
            ))
            .await
            .unwrap();
        }

        assert!(store.hold(hold.id).await.unwrap().is_none());
        assert!(store.metrics_events(Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_writes_become_visible_together() {
        let (store, product) = seeded(5).await;
        let now = Utc::now();
        let hold = Hold::new(HoldId::new(), product.id, 2, now, ChronoDuration::minutes(2)).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_hold(&hold).await.unwrap();
        let snapshot = tx.stock_snapshot(&product, now).await.unwrap();
        assert_eq!(snapshot.held, 2, "transaction sees its own writes");
        tx.commit().await.unwrap();

        let snapshot = store.stock_snapshot(product.id, now).await.unwrap().unwrap();
        assert_eq!(snapshot.available(), 3);
    }

    #[tokio::test]
    async fn row_lock_times_out_while_held() {
        let store = InMemoryStore::with_lock_timeout(std::time::Duration::from_millis(20));
        let product = Product::new(ProductId::new(), "Item", 100, 1, Utc::now()).unwrap();
        store.insert_product(&product).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_product(product.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.lock_product(product.id).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));
        assert!(err.is_retryable());

        drop(first);
        assert!(second.lock_product(product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_idempotency_insert_is_rejected_until_release() {
        let store = InMemoryStore::new();
        let record = IdempotencyRecord::processing("k-1", OrderId::new(), json!({}), Utc::now());

        let mut first = store.begin().await.unwrap();
        first.insert_idempotency_record(&record).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.insert_idempotency_record(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        drop(first);
        let mut third = store.begin().await.unwrap();
        third.insert_idempotency_record(&record).await.unwrap();
        third.commit().await.unwrap();

        let mut fourth = store.begin().await.unwrap();
        assert!(fourth.insert_idempotency_record(&record).await.is_err());
    }

    #[tokio::test]
    async fn stock_adjustment_cannot_go_negative() {
        let (store, product) = seeded(1).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.adjust_product_stock(product.id, -2, Utc::now()).await.is_err());
        tx.adjust_product_stock(product.id, -1, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn second_order_for_same_hold_is_a_duplicate() {
        let (store, product) = seeded(5).await;
        let now = Utc::now();
        let hold = Hold::new(HoldId::new(), product.id, 1, now, ChronoDuration::minutes(2)).unwrap();
        let first = Order::from_hold(OrderId::new(), &hold, &product, now).unwrap();
        let second = Order::from_hold(OrderId::new(), &hold, &product, now).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&first).await.unwrap();
        assert!(matches!(
            tx.insert_order(&second).await,
            Err(StoreError::DuplicateKey(_))
        ));
    }
}
