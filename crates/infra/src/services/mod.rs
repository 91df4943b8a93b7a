//! The reservation services.
//!
//! All five share one store, one stock cache and one clock. [`ReservationServices`]
//! wires them together from [`ReservationSettings`].

pub mod holds;
pub mod orders;
pub mod payments;
pub mod stock_ledger;
pub mod sweeper;

use std::sync::Arc;

use flashsale_core::Clock;

use crate::cache::StockCache;
use crate::config::ReservationSettings;
use crate::lease::LeaseLock;
use crate::store::Store;

pub use holds::HoldManager;
pub use orders::OrderManager;
pub use payments::{
    PaymentNotification, PaymentSettlement, SettlementReceipt, ALREADY_PROCESSED, PAYMENT_FAILED,
    PAYMENT_SUCCESSFUL,
};
pub use stock_ledger::StockLedger;
pub use sweeper::{ExpirySweeper, SweepOutcome, SweeperHandle, SweeperStats, SWEEP_LEASE_NAME};

#[derive(Clone)]
pub struct ReservationServices {
    pub ledger: StockLedger,
    pub holds: HoldManager,
    pub orders: OrderManager,
    pub payments: PaymentSettlement,
    pub sweeper: ExpirySweeper,
}

impl ReservationServices {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn StockCache>,
        lease: Arc<dyn LeaseLock>,
        clock: Arc<dyn Clock>,
        settings: &ReservationSettings,
    ) -> Self {
        let window = chrono::Duration::from_std(settings.hold_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let ledger = StockLedger::new(
            store.clone(),
            cache,
            clock.clone(),
            settings.stock_cache_ttl,
        );

        Self {
            holds: HoldManager::new(store.clone(), ledger.clone(), clock.clone(), window),
            orders: OrderManager::new(store.clone(), ledger.clone(), clock.clone()),
            payments: PaymentSettlement::new(
                store.clone(),
                ledger.clone(),
                clock.clone(),
                settings.order_lookup_policy(),
            ),
            sweeper: ExpirySweeper::new(store, ledger.clone(), lease, clock, settings.sweep_lease_ttl),
            ledger,
        }
    }
}
