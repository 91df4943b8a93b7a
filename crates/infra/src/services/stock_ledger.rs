use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use flashsale_core::{Clock, DomainError, ProductId};

use crate::cache::StockCache;
use crate::error::ServiceResult;
use crate::store::Store;

/// Computes and caches available stock per product.
///
/// Reads go through the cache; admission decisions never do. Every service that
/// changes a product's holds, pending orders or committed stock calls
/// [`StockLedger::invalidate`] once its transaction has committed.
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
    cache: Arc<dyn StockCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl StockLedger {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn StockCache>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            ttl,
        }
    }

    /// `max(0, committed - held - pending)`, served from cache when fresh.
    #[instrument(skip_all, fields(product_id = %product_id))]
    pub async fn available_stock(&self, product_id: ProductId) -> ServiceResult<i64> {
        match self.cache.get(product_id).await {
            Ok(Some(available)) => return Ok(available),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "stock cache read failed; computing from store"),
        }

        let snapshot = self
            .store
            .stock_snapshot(product_id, self.clock.now())
            .await?
            .ok_or(DomainError::not_found("Product"))?;
        let available = snapshot.available();

        if let Err(e) = self.cache.put(product_id, available, self.ttl).await {
            tracing::warn!(error = %e, "stock cache write failed");
        }
        Ok(available)
    }

    /// Drop the cached value. Failures are logged; the entry then ages out on its TTL.
    pub async fn invalidate(&self, product_id: ProductId) {
        if let Err(e) = self.cache.invalidate(product_id).await {
            tracing::warn!(product_id = %product_id, error = %e, "stock cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use flashsale_core::{HoldId, ManualClock};
    use flashsale_inventory::{Hold, Product};

    use crate::cache::{CacheError, InMemoryStockCache};
    use crate::store::InMemoryStore;

    struct BrokenCache;

    #[async_trait]
    impl StockCache for BrokenCache {
        async fn get(&self, _: ProductId) -> Result<Option<i64>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn put(&self, _: ProductId, _: i64, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn invalidate(&self, _: ProductId) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    async fn store_with_product(stock: i64) -> (Arc<InMemoryStore>, Product) {
        let store = InMemoryStore::arc();
        let product = Product::new(ProductId::new(), "Item", 100, stock, Utc::now()).unwrap();
        store.insert_product(&product).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn cached_value_is_served_until_invalidated() {
        let (store, product) = store_with_product(5).await;
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(InMemoryStockCache::new(clock.clone()));
        let ledger = StockLedger::new(store.clone(), cache, clock.clone(), Duration::from_secs(5));

        assert_eq!(ledger.available_stock(product.id).await.unwrap(), 5);

        let hold = Hold::new(HoldId::new(), product.id, 2, clock.now(), chrono::Duration::minutes(2))
            .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_hold(&hold).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ledger.available_stock(product.id).await.unwrap(), 5, "stale until invalidated");
        ledger.invalidate(product.id).await;
        assert_eq!(ledger.available_stock(product.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_store() {
        let (store, product) = store_with_product(4).await;
        let ledger = StockLedger::new(
            store,
            Arc::new(BrokenCache),
            Arc::new(ManualClock::starting_now()),
            Duration::from_secs(5),
        );

        assert_eq!(ledger.available_stock(product.id).await.unwrap(), 4);
        ledger.invalidate(product.id).await;
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStore::arc();
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = StockLedger::new(
            store,
            Arc::new(InMemoryStockCache::new(clock.clone())),
            clock,
            Duration::from_secs(5),
        );

        let err = ledger.available_stock(ProductId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Domain(DomainError::NotFound(_))
        ));
    }
}
