use std::sync::Arc;

use tracing::instrument;

use flashsale_core::{Clock, DomainError, HoldId, OrderId};
use flashsale_inventory::Order;

use crate::error::ServiceResult;
use crate::store::Store;

use super::{HoldManager, StockLedger};

/// Converts valid holds into pending orders.
#[derive(Clone)]
pub struct OrderManager {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    clock: Arc<dyn Clock>,
}

impl OrderManager {
    pub fn new(store: Arc<dyn Store>, ledger: StockLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Turn a hold into a pending order and consume the hold, atomically.
    ///
    /// The hold row lock makes this single-use: a concurrent second attempt waits,
    /// then sees the hold as used. Locks are taken hold → product, and expiry is judged
    /// only once both are held: a `create_hold` on the same product sees either the
    /// order or an expired hold, never both.
    #[instrument(skip_all, fields(hold_id = %hold_id))]
    pub async fn create_order(&self, hold_id: HoldId) -> ServiceResult<Order> {
        let mut tx = self.store.begin().await?;

        let mut hold = tx
            .lock_hold(hold_id)
            .await?
            .ok_or(DomainError::not_found("Hold"))?;
        let product = tx
            .lock_product(hold.product_id)
            .await?
            .ok_or(DomainError::not_found("Product"))?;

        let now = self.clock.now();
        if let Err(e) = hold.ensure_valid(now) {
            tracing::warn!(reason = e.code(), "order rejected");
            return Err(e.into());
        }

        let order = Order::from_hold(OrderId::new(), &hold, &product, now)?;

        tx.insert_order(&order).await?;
        HoldManager::mark_used(tx.as_mut(), &mut hold, now).await?;
        tx.commit().await?;

        self.ledger.invalidate(product.id).await;
        tracing::info!(
            order_id = %order.id,
            quantity = order.quantity,
            total_price = order.total_price,
            "order created"
        );
        Ok(order)
    }

    pub async fn order(&self, order_id: OrderId) -> ServiceResult<Order> {
        Ok(self
            .store
            .order(order_id)
            .await?
            .ok_or(DomainError::not_found("Order"))?)
    }
}
