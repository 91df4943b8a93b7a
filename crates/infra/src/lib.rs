//! Infrastructure layer: storage, cache and lease adapters, configuration, and the
//! reservation services that run on top of them.

pub mod cache;
pub mod config;
pub mod error;
pub mod lease;
pub mod retry;
pub mod services;
pub mod store;


pub use config::{ReservationSettings, Settings};
pub use error::{ServiceError, ServiceResult};
pub use services::{
    ExpirySweeper, HoldManager, OrderManager, PaymentNotification, PaymentSettlement,
    ReservationServices, SettlementReceipt, StockLedger, SweepOutcome, SweeperHandle,
};
