use std::sync::Arc;

use anyhow::Context;

use flashsale_core::{Clock, ProductId, SystemClock};
use flashsale_infra::cache::{InMemoryStockCache, RedisStockCache, StockCache};
use flashsale_infra::lease::{InMemoryLeaseLock, LeaseLock, RedisLeaseLock};
use flashsale_infra::store::{InMemoryStore, PostgresStore, Store};
use flashsale_infra::{ReservationServices, ReservationSettings, Settings};
use flashsale_inventory::Product;

/// Everything the handlers need, shared through an `Extension`.
pub struct AppServices {
    pub store: Arc<dyn Store>,
    pub reservations: ReservationServices,
    pub clock: Arc<dyn Clock>,
}

impl AppServices {
    /// Wire adapters from configuration.
    ///
    /// `DATABASE_URL` selects Postgres (migrated on startup), `REDIS_URL` selects the
    /// shared cache and sweep lease. Without them the process runs on in-memory
    /// adapters, which is only correct for a single instance.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let reservation = &settings.reservation;

        let store: Arc<dyn Store> = match &settings.database {
            Some(db) => {
                let store = PostgresStore::connect(&db.url, db.max_connections, reservation.lock_timeout)
                    .await
                    .context("failed to connect to Postgres")?;
                store.migrate().await.context("failed to apply migrations")?;
                tracing::info!(max_connections = db.max_connections, "using Postgres store");
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory store");
                Arc::new(InMemoryStore::with_lock_timeout(reservation.lock_timeout))
            }
        };

        let (cache, lease): (Arc<dyn StockCache>, Arc<dyn LeaseLock>) = match &settings.redis_url {
            Some(url) => {
                let cache = RedisStockCache::new(url)
                    .await
                    .context("failed to connect stock cache to Redis")?;
                let lease = RedisLeaseLock::new(url)
                    .await
                    .context("failed to connect sweep lease to Redis")?;
                tracing::info!("using Redis stock cache and sweep lease");
                (Arc::new(cache), Arc::new(lease))
            }
            None => {
                tracing::warn!("REDIS_URL not set; using in-memory cache and lease");
                (
                    Arc::new(InMemoryStockCache::new(clock.clone())),
                    Arc::new(InMemoryLeaseLock::new(clock.clone())),
                )
            }
        };

        Ok(Self::assemble(store, cache, lease, clock, reservation))
    }

    /// Fully in-memory wiring with an injectable clock (dev server, tests).
    pub fn in_memory(settings: &ReservationSettings, clock: Arc<dyn Clock>) -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::with_lock_timeout(settings.lock_timeout));
        let cache = Arc::new(InMemoryStockCache::new(clock.clone()));
        let lease = Arc::new(InMemoryLeaseLock::new(clock.clone()));
        Self::assemble(store, cache, lease, clock, settings)
    }

    fn assemble(
        store: Arc<dyn Store>,
        cache: Arc<dyn StockCache>,
        lease: Arc<dyn LeaseLock>,
        clock: Arc<dyn Clock>,
        settings: &ReservationSettings,
    ) -> Self {
        let reservations =
            ReservationServices::new(store.clone(), cache, lease, clock.clone(), settings);
        Self {
            store,
            reservations,
            clock,
        }
    }

    /// Insert a product directly into the catalog.
    pub async fn insert_product(
        &self,
        name: &str,
        price: u64,
        stock: i64,
    ) -> anyhow::Result<Product> {
        let product = Product::new(ProductId::new(), name, price, stock, self.clock.now())?;
        self.store
            .insert_product(&product)
            .await
            .context("failed to insert product")?;
        Ok(product)
    }

    pub async fn seed_demo_product(&self) -> anyhow::Result<Product> {
        self.insert_product("Flash Sale Item", 9_999, 100).await
    }
}
