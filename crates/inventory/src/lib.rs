//! Flash-sale inventory domain.
//!
//! Products, holds, orders, idempotency records and metrics events, with the state
//! transitions and stock arithmetic that govern them. Everything here is
//! deterministic domain logic (no IO, no HTTP, no storage); "now" is always passed in.

pub mod hold;
pub mod idempotency;
pub mod metrics;
pub mod order;
pub mod product;
pub mod stock;

pub use hold::{Hold, HoldState, ReleaseReason};
pub use idempotency::{IdempotencyRecord, IdempotencyStatus};
pub use metrics::{MetricsEvent, MetricsEventKind};
pub use order::{Order, OrderStatus, PaymentOutcome};
pub use product::Product;
pub use stock::StockSnapshot;
