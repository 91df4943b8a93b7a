//! Named, time-limited mutual exclusion across service instances.
//!
//! Used to keep at most one expiry sweep running at a time. A lease that is not
//! released explicitly lapses after its TTL, so a crashed holder cannot block the
//! sweep forever. Release is token-checked: only the holder's own lease is removed.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use in_memory::InMemoryLeaseLock;
#[cfg(feature = "redis")]
pub use self::redis::RedisLeaseLock;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease backend error: {0}")]
    Backend(String),
}

/// Proof of holding a named lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub token: Uuid,
}

impl Lease {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: Uuid::now_v7(),
        }
    }
}

#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Take the lease if nobody holds it; `None` when it is already held.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError>;

    /// Give the lease back. Returns `false` if it had already lapsed or changed hands.
    async fn release(&self, lease: &Lease) -> Result<bool, LeaseError>;
}
