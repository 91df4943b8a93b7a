//! Redis-backed lease (optional, behind the `redis` feature).
//!
//! Acquire is `SET name token NX PX ttl`; release deletes the key only if it still
//! carries our token, atomically via a Lua script.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;

use super::{Lease, LeaseError, LeaseLock};
use crate::cache::expiry_millis;

const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    else
        return 0
    end
"#;

#[derive(Clone)]
pub struct RedisLeaseLock {
    conn_manager: ConnectionManager,
}

impl RedisLeaseLock {
    pub async fn new(redis_url: &str) -> Result<Self, LeaseError> {
        let client = Client::open(redis_url)
            .map_err(|e| LeaseError::Backend(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| LeaseError::Backend(format!("failed to connect to Redis: {e}")))?;
        Ok(Self { conn_manager })
    }
}

impl std::fmt::Debug for RedisLeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLeaseLock").finish_non_exhaustive()
    }
}

#[async_trait]
impl LeaseLock for RedisLeaseLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError> {
        let mut conn = self.conn_manager.clone();
        let lease = Lease::new(name);

        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(lease.token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| LeaseError::Backend(format!("SET NX failed: {e}")))?;

        Ok(reply.map(|_| lease))
    }

    async fn release(&self, lease: &Lease) -> Result<bool, LeaseError> {
        let mut conn = self.conn_manager.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&lease.name)
            .arg(lease.token.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LeaseError::Backend(format!("lease release failed: {e}")))?;
        Ok(deleted == 1)
    }
}
