use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use flashsale_core::Clock;

use super::{Lease, LeaseError, LeaseLock};

/// Process-local lease table; expiry follows the injected clock.
#[derive(Debug)]
pub struct InMemoryLeaseLock {
    clock: Arc<dyn Clock>,
    held: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl InMemoryLeaseLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            held: Mutex::new(HashMap::new()),
        }
    }

    fn held(&self) -> Result<MutexGuard<'_, HashMap<String, (Uuid, DateTime<Utc>)>>, LeaseError> {
        self.held
            .lock()
            .map_err(|_| LeaseError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LeaseLock for InMemoryLeaseLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError> {
        let now = self.clock.now();
        let lapse = chrono::Duration::from_std(ttl)
            .map_err(|e| LeaseError::Backend(format!("invalid ttl: {e}")))?;

        let mut held = self.held()?;
        if let Some((_, expires_at)) = held.get(name) {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let lease = Lease::new(name);
        held.insert(name.to_string(), (lease.token, now + lapse));
        Ok(Some(lease))
    }

    async fn release(&self, lease: &Lease) -> Result<bool, LeaseError> {
        let mut held = self.held()?;
        match held.get(&lease.name) {
            Some((token, _)) if *token == lease.token => {
                held.remove(&lease.name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
