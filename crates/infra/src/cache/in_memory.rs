use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flashsale_core::{Clock, ProductId};

use super::{CacheError, StockCache};

/// Process-local cache whose entries expire against the injected clock.
#[derive(Debug)]
pub struct InMemoryStockCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<ProductId, (i64, DateTime<Utc>)>>,
}

impl InMemoryStockCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ProductId, (i64, DateTime<Utc>)>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl StockCache for InMemoryStockCache {
    async fn get(&self, product_id: ProductId) -> Result<Option<i64>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries()?;
        match entries.get(&product_id) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(*value)),
            Some(_) => {
                entries.remove(&product_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        product_id: ProductId,
        available: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Backend(format!("invalid ttl: {e}")))?;
        let expires_at = self.clock.now() + ttl;
        self.entries()?.insert(product_id, (available, expires_at));
        Ok(())
    }

    async fn invalidate(&self, product_id: ProductId) -> Result<(), CacheError> {
        self.entries()?.remove(&product_id);
        Ok(())
    }
}
