//! `flashsale-core`: domain foundation building blocks.
//!
//! Identifiers, the domain error model and the clock abstraction shared by every
//! other crate. No infrastructure concerns live here.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{HoldId, MetricsEventId, OrderId, ProductId};
