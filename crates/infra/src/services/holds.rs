use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use flashsale_core::{Clock, DomainError, HoldId, ProductId};
use flashsale_inventory::{Hold, MetricsEvent, MetricsEventKind, ReleaseReason};

use crate::error::ServiceResult;
use crate::store::{Store, StoreError, StoreTx};

use super::StockLedger;

/// Creates, releases and consumes holds.
#[derive(Clone)]
pub struct HoldManager {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
}

impl HoldManager {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: StockLedger,
        clock: Arc<dyn Clock>,
        window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            window,
        }
    }

    /// Reserve `quantity` units of a product for the hold window.
    ///
    /// Admission is decided under the product row lock against a fresh computation,
    /// never against the cache, so concurrent callers cannot reserve more than the
    /// committed stock.
    #[instrument(skip_all, fields(product_id = %product_id, quantity = quantity))]
    pub async fn create_hold(&self, product_id: ProductId, quantity: u32) -> ServiceResult<Hold> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }

        let mut tx = self.store.begin().await?;

        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or(DomainError::not_found("Product"))?;
        let now = self.clock.now();
        let snapshot = tx.stock_snapshot(&product, now).await?;
        let available = snapshot.available();

        if !snapshot.can_cover(quantity) {
            tracing::warn!(quantity, available, "hold rejected: insufficient stock");
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available,
            }
            .into());
        }

        let hold = Hold::new(HoldId::new(), product.id, quantity, now, self.window)?;
        tx.insert_hold(&hold).await?;

        let available_after = available - i64::from(quantity);
        tx.record_metric(&MetricsEvent::new(
            MetricsEventKind::HoldCreated {
                hold_id: hold.id,
                product_id: product.id,
                quantity,
                available_stock_after: available_after,
            },
            now,
        ))
        .await?;

        tx.commit().await?;
        self.ledger.invalidate(product.id).await;

        tracing::info!(
            hold_id = %hold.id,
            quantity,
            available_after,
            expires_at = %hold.expires_at,
            "hold created"
        );
        Ok(hold)
    }

    /// Manually release a hold. Releasing a used or released hold is a no-op.
    #[instrument(skip_all, fields(hold_id = %hold_id))]
    pub async fn release_hold(&self, hold_id: HoldId) -> ServiceResult<Hold> {
        let mut tx = self.store.begin().await?;

        let mut hold = tx
            .lock_hold(hold_id)
            .await?
            .ok_or(DomainError::not_found("Hold"))?;
        let now = self.clock.now();
        let reason = Self::release_locked(tx.as_mut(), &mut hold, now).await?;
        tx.commit().await?;

        if let Some(reason) = reason {
            self.ledger.invalidate(hold.product_id).await;
            tracing::info!(reason = reason.as_str(), "hold released");
        }
        Ok(hold)
    }

    /// Release a hold already locked by `tx`.
    ///
    /// Returns the reason recorded in the `hold_released` event, or `None` if the hold
    /// was already terminal and nothing was written. The caller invalidates the stock
    /// cache after commit.
    pub async fn release_locked(
        tx: &mut dyn StoreTx,
        hold: &mut Hold,
        now: DateTime<Utc>,
    ) -> Result<Option<ReleaseReason>, StoreError> {
        let Some(reason) = hold.release(now) else {
            return Ok(None);
        };

        tx.save_hold(hold).await?;
        tx.record_metric(&MetricsEvent::new(
            MetricsEventKind::HoldReleased {
                hold_id: hold.id,
                product_id: hold.product_id,
                quantity: hold.quantity,
                reason,
            },
            now,
        ))
        .await?;
        Ok(Some(reason))
    }

    /// Consume a hold locked by `tx` for an order.
    pub async fn mark_used(
        tx: &mut dyn StoreTx,
        hold: &mut Hold,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        hold.mark_used(now)?;
        tx.save_hold(hold).await?;
        Ok(())
    }

    pub async fn hold(&self, hold_id: HoldId) -> ServiceResult<Hold> {
        Ok(self
            .store
            .hold(hold_id)
            .await?
            .ok_or(DomainError::not_found("Hold"))?)
    }
}
