//! Idempotent application of payment-provider notifications.
//!
//! Two guards stand between a notification and a double settlement:
//!
//! 1. the idempotency ledger, unique on the provider's key: a completed key is
//!    answered from the ledger without touching the order
//! 2. the order row lock plus the pending check: a second key for an already settled
//!    order changes nothing
//!
//! The notification may arrive before the order it names has committed, so the order
//! lookup is retried on a fixed delay before giving up.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::instrument;

use flashsale_core::{Clock, OrderId};
use flashsale_inventory::{
    IdempotencyRecord, MetricsEvent, MetricsEventKind, Order, OrderStatus, PaymentOutcome,
};

use crate::error::{ServiceError, ServiceResult};
use crate::retry::RetryPolicy;
use crate::store::{Store, StoreError, StoreTx};

use super::StockLedger;

pub const PAYMENT_SUCCESSFUL: &str = "Payment successful";
pub const PAYMENT_FAILED: &str = "Payment failed";
pub const ALREADY_PROCESSED: &str = "Webhook already processed";

/// A payment outcome as delivered by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotification {
    pub idempotency_key: String,
    pub order_id: OrderId,
    pub outcome: PaymentOutcome,
    /// The raw body, kept verbatim in the idempotency ledger.
    pub payload: JsonValue,
}

/// What the caller is told about a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub message: &'static str,
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    /// The key had already been processed; nothing was changed.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct PaymentSettlement {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl PaymentSettlement {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: StockLedger,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            policy,
        }
    }

    /// Apply a notification exactly once per idempotency key.
    ///
    /// A concurrent delivery of the same key loses the ledger insert; its transaction
    /// is rolled back and the protocol re-runs, normally ending in the replay path.
    #[instrument(
        skip(self, notification),
        fields(
            idempotency_key = %notification.idempotency_key,
            order_id = %notification.order_id,
            outcome = notification.outcome.as_str()
        )
    )]
    pub async fn apply_outcome(
        &self,
        notification: &PaymentNotification,
    ) -> ServiceResult<SettlementReceipt> {
        let mut attempt = 1;
        loop {
            match self.try_apply(notification).await? {
                Some(receipt) => return Ok(receipt),
                None if self.policy.should_retry(attempt) => {
                    tracing::debug!(attempt, "idempotency key claimed concurrently; re-running");
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(ServiceError::Contention(format!(
                        "idempotency key {} still contended after {attempt} attempts",
                        notification.idempotency_key
                    )));
                }
            }
        }
    }

    /// One run of the protocol in one transaction. `None` means another delivery of
    /// the same key won the ledger insert.
    async fn try_apply(
        &self,
        notification: &PaymentNotification,
    ) -> ServiceResult<Option<SettlementReceipt>> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let existing = tx.idempotency_record(&notification.idempotency_key).await?;
        if let Some(record) = existing.as_ref().filter(|r| r.is_completed()) {
            let order = self.resolve_order(tx.as_mut(), record.order_id).await?;
            tracing::info!(order_status = %order.status, "webhook replayed");
            return Ok(Some(SettlementReceipt {
                message: ALREADY_PROCESSED,
                order_id: order.id,
                order_status: order.status,
                replayed: true,
            }));
        }

        let order = self
            .resolve_order(tx.as_mut(), notification.order_id)
            .await?;

        let mut record = match existing {
            Some(record) => record,
            None => {
                let record = IdempotencyRecord::processing(
                    notification.idempotency_key.clone(),
                    order.id,
                    notification.payload.clone(),
                    now,
                );
                match tx.insert_idempotency_record(&record).await {
                    Ok(()) => record,
                    Err(StoreError::DuplicateKey(_)) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let mut order = tx
            .lock_order(order.id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order.id))?;
        let changed = order.settle(notification.outcome, now).is_some();

        if changed {
            tx.save_order(&order).await?;
            let kind = match notification.outcome {
                PaymentOutcome::Success => {
                    tx.adjust_product_stock(order.product_id, -i64::from(order.quantity), now)
                        .await?;
                    MetricsEventKind::OrderPaid {
                        order_id: order.id,
                        product_id: order.product_id,
                        quantity: order.quantity,
                    }
                }
                PaymentOutcome::Failure => MetricsEventKind::OrderCancelled {
                    order_id: order.id,
                    product_id: order.product_id,
                    quantity: order.quantity,
                },
            };
            tx.record_metric(&MetricsEvent::new(kind, now)).await?;
        } else {
            tracing::info!(order_status = %order.status, "order already settled; no change");
        }

        record.complete(order.id, now);
        tx.save_idempotency_record(&record).await?;
        tx.commit().await?;

        if changed {
            self.ledger.invalidate(order.product_id).await;
            tracing::info!(order_status = %order.status, "order settled");
        }

        Ok(Some(SettlementReceipt {
            message: match notification.outcome {
                PaymentOutcome::Success => PAYMENT_SUCCESSFUL,
                PaymentOutcome::Failure => PAYMENT_FAILED,
            },
            order_id: order.id,
            order_status: order.status,
            replayed: false,
        }))
    }

    /// Find an order, waiting for it to become visible within the retry budget.
    async fn resolve_order(&self, tx: &mut dyn StoreTx, order_id: OrderId) -> ServiceResult<Order> {
        let mut attempt = 1;
        loop {
            if let Some(order) = tx.find_order(order_id).await? {
                return Ok(order);
            }
            if !self.policy.should_retry(attempt) {
                tracing::error!(attempts = attempt, "order not found after retries");
                return Err(ServiceError::OrderNotFound(order_id));
            }
            tracing::debug!(attempt, "order not visible yet; retrying lookup");
            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }
}
