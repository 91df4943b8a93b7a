//! Redis-backed stock cache (optional, behind the `redis` feature).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use flashsale_core::ProductId;

use super::{expiry_millis, stock_key, CacheError, StockCache};

/// Stock cache shared by every service instance through Redis.
#[derive(Clone)]
pub struct RedisStockCache {
    conn_manager: ConnectionManager,
}

impl RedisStockCache {
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("failed to connect to Redis: {e}")))?;
        Ok(Self { conn_manager })
    }
}

impl std::fmt::Debug for RedisStockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStockCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl StockCache for RedisStockCache {
    async fn get(&self, product_id: ProductId) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.get(stock_key(product_id))
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))
    }

    async fn put(
        &self,
        product_id: ProductId,
        available: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(stock_key(product_id))
            .arg(available)
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("SET failed: {e}")))?;
        Ok(())
    }

    async fn invalidate(&self, product_id: ProductId) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .del(stock_key(product_id))
            .await
            .map_err(|e| CacheError::Backend(format!("DEL failed: {e}")))?;
        Ok(())
    }
}
