//! Available-stock arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hold::Hold;
use crate::order::Order;

/// The three quantities that determine what can still be reserved.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    /// Committed (unsold) stock on the product.
    pub committed: i64,
    /// Sum of quantities of holds that are active and unexpired.
    pub held: i64,
    /// Sum of quantities of orders still pending payment.
    pub pending: i64,
}

impl StockSnapshot {
    pub fn new(committed: i64, held: i64, pending: i64) -> Self {
        Self {
            committed,
            held,
            pending,
        }
    }

    /// Fold raw rows for one product into a snapshot as of `now`.
    pub fn from_rows<'a>(
        committed: i64,
        holds: impl IntoIterator<Item = &'a Hold>,
        orders: impl IntoIterator<Item = &'a Order>,
        now: DateTime<Utc>,
    ) -> Self {
        let held = holds
            .into_iter()
            .filter(|h| h.is_valid(now))
            .map(|h| i64::from(h.quantity))
            .sum();
        let pending = orders
            .into_iter()
            .filter(|o| o.is_pending())
            .map(|o| i64::from(o.quantity))
            .sum();

        Self::new(committed, held, pending)
    }

    /// `max(0, committed - held - pending)`.
    pub fn available(&self) -> i64 {
        (self.committed - self.held - self.pending).max(0)
    }

    pub fn can_cover(&self, quantity: u32) -> bool {
        i64::from(quantity) <= self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flashsale_core::{HoldId, OrderId, ProductId};

    use crate::order::PaymentOutcome;
    use crate::product::Product;

    #[test]
    fn available_subtracts_holds_and_pending_orders() {
        assert_eq!(StockSnapshot::new(10, 3, 2).available(), 5);
        assert!(StockSnapshot::new(10, 3, 2).can_cover(5));
        assert!(!StockSnapshot::new(10, 3, 2).can_cover(6));
    }

    #[test]
    fn available_clamps_at_zero() {
        assert_eq!(StockSnapshot::new(1, 3, 2).available(), 0);
    }

    #[test]
    fn from_rows_ignores_expired_used_released_and_settled() {
        let now = Utc::now();
        let product = Product::new(ProductId::new(), "Item", 100, 10, now).unwrap();
        let window = Duration::minutes(2);

        let active = Hold::new(HoldId::new(), product.id, 1, now, window).unwrap();
        let expired = Hold::new(HoldId::new(), product.id, 2, now - Duration::minutes(5), window).unwrap();
        let mut released = Hold::new(HoldId::new(), product.id, 4, now, window).unwrap();
        released.release(now);
        let mut used = Hold::new(HoldId::new(), product.id, 3, now, window).unwrap();
        let pending = Order::from_hold(OrderId::new(), &used, &product, now).unwrap();
        used.mark_used(now).unwrap();

        let mut paid_hold = Hold::new(HoldId::new(), product.id, 5, now, window).unwrap();
        let mut paid = Order::from_hold(OrderId::new(), &paid_hold, &product, now).unwrap();
        paid_hold.mark_used(now).unwrap();
        paid.settle(PaymentOutcome::Success, now);

        let holds = [active, expired, released, used, paid_hold];
        let orders = [pending, paid];
        let snapshot = StockSnapshot::from_rows(product.stock, &holds, &orders, now);

        assert_eq!(snapshot, StockSnapshot::new(10, 1, 3));
        assert_eq!(snapshot.available(), 6);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: available stock is never negative and never exceeds committed.
            #[test]
            fn available_is_bounded(
                committed in 0i64..10_000,
                held in 0i64..10_000,
                pending in 0i64..10_000,
            ) {
                let s = StockSnapshot::new(committed, held, pending);
                prop_assert!(s.available() >= 0);
                prop_assert!(s.available() <= committed);
            }

            /// Property: greedily admitting requests that `can_cover` never reserves more
            /// than the committed stock.
            #[test]
            fn admitting_covered_requests_never_oversells(
                committed in 0i64..100,
                requests in prop::collection::vec(1u32..10, 0..50),
            ) {
                let mut s = StockSnapshot::new(committed, 0, 0);
                for q in requests {
                    if s.can_cover(q) {
                        s.held += i64::from(q);
                    }
                }
                prop_assert!(s.held <= committed);
            }
        }
    }
}
