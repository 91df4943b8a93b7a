//! Short-lived cache of computed available stock.
//!
//! The cache is advisory: readers fall back to the store when it fails, and writers
//! invalidate after every commit that changes a product's reservations. It must never
//! be consulted to admit a hold.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use flashsale_core::ProductId;

pub use in_memory::InMemoryStockCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisStockCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key under which a product's available stock is cached.
pub fn stock_key(product_id: ProductId) -> String {
    format!("product:{product_id}:available_stock")
}

/// Redis `PX` argument for a TTL: whole milliseconds, at least 1.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
pub trait StockCache: Send + Sync {
    async fn get(&self, product_id: ProductId) -> Result<Option<i64>, CacheError>;

    async fn put(
        &self,
        product_id: ProductId,
        available: i64,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn invalidate(&self, product_id: ProductId) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_ttls_keep_millisecond_precision() {
        assert_eq!(expiry_millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(expiry_millis(Duration::from_millis(250)), 250);
    }

    #[test]
    fn zero_ttl_still_expires() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_micros(10)), 1);
    }
}
