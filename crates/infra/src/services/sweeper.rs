//! Batch release of expired holds.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use flashsale_core::Clock;
use flashsale_inventory::{MetricsEvent, MetricsEventKind};

use crate::error::ServiceResult;
use crate::lease::LeaseLock;
use crate::store::Store;

use super::{HoldManager, StockLedger};

/// Lease that keeps sweeps from overlapping across instances.
pub const SWEEP_LEASE_NAME: &str = "holds:release-expired:lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep holds the lease; nothing was done.
    Skipped,
    Completed { released: u64 },
}

impl SweepOutcome {
    pub fn released(&self) -> u64 {
        match self {
            SweepOutcome::Skipped => 0,
            SweepOutcome::Completed { released } => *released,
        }
    }
}

#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    lease: Arc<dyn LeaseLock>,
    clock: Arc<dyn Clock>,
    lease_ttl: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: StockLedger,
        lease: Arc<dyn LeaseLock>,
        clock: Arc<dyn Clock>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            lease,
            clock,
            lease_ttl,
        }
    }

    /// Release every expired, unused, unreleased hold in one transaction.
    ///
    /// Returns [`SweepOutcome::Skipped`] when the lease is held elsewhere. The lease
    /// is given back whether or not the sweep succeeded.
    #[instrument(skip(self))]
    pub async fn release_expired_holds(&self) -> ServiceResult<SweepOutcome> {
        let Some(lease) = self
            .lease
            .try_acquire(SWEEP_LEASE_NAME, self.lease_ttl)
            .await?
        else {
            tracing::info!("expiry sweep already running; skipped");
            return Ok(SweepOutcome::Skipped);
        };

        let result = self.sweep().await;

        match self.lease.release(&lease).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("sweep lease lapsed before release"),
            Err(e) => tracing::warn!(error = %e, "failed to release sweep lease"),
        }

        let released = result?;
        Ok(SweepOutcome::Completed { released })
    }

    async fn sweep(&self) -> ServiceResult<u64> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut holds = tx.lock_expired_holds(now).await?;
        let mut affected = BTreeSet::new();
        let mut released = 0u64;

        for hold in &mut holds {
            if HoldManager::release_locked(tx.as_mut(), hold, now)
                .await?
                .is_some()
            {
                released += 1;
                affected.insert(hold.product_id);
            }
        }

        if released > 0 {
            tx.record_metric(&MetricsEvent::new(
                MetricsEventKind::HoldsBatchReleased { count: released },
                now,
            ))
            .await?;
        }
        tx.commit().await?;

        for product_id in affected {
            self.ledger.invalidate(product_id).await;
        }
        if released > 0 {
            tracing::info!(released, "expired holds released");
        }
        Ok(released)
    }

    /// Run the sweep on a fixed interval until the handle is shut down.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let task_stats = stats.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let outcome = self.release_expired_holds().await;
                        let mut stats = task_stats.lock().unwrap_or_else(PoisonError::into_inner);
                        stats.sweeps_run += 1;
                        match outcome {
                            Ok(SweepOutcome::Skipped) => stats.sweeps_skipped += 1,
                            Ok(SweepOutcome::Completed { released }) => stats.holds_released += released,
                            Err(e) if e.is_retryable() => {
                                stats.failures += 1;
                                tracing::warn!(error = %e, "expiry sweep lost to contention; retrying next tick");
                            }
                            Err(e) => {
                                stats.failures += 1;
                                tracing::error!(error = %e, "expiry sweep failed");
                            }
                        }
                    }
                }
            }
            tracing::info!("expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
            stats,
        }
    }
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Stop the loop and wait for an in-progress sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sweeper runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweeperStats {
    pub sweeps_run: u64,
    pub sweeps_skipped: u64,
    pub holds_released: u64,
    pub failures: u64,
}
