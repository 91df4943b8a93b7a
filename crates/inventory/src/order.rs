use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{DomainError, DomainResult, HoldId, OrderId, ProductId};

use crate::hold::Hold;
use crate::product::Product;

/// Order status lifecycle: `pending` → `paid` | `cancelled`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// Outcome reported by the payment provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failure,
}

impl PaymentOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failure => "failure",
        }
    }
}

/// An order created from exactly one hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub hold_id: HoldId,
    pub quantity: u32,
    /// Product price × quantity, fixed at creation.
    pub total_price: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a pending order for the hold's quantity at the product's current price.
    pub fn from_hold(
        id: OrderId,
        hold: &Hold,
        product: &Product,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if hold.product_id != product.id {
            return Err(DomainError::validation("hold does not belong to product"));
        }

        Ok(Self {
            id,
            product_id: product.id,
            hold_id: hold.id,
            quantity: hold.quantity,
            total_price: product.price_for(hold.quantity)?,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Apply a payment outcome.
    ///
    /// Returns the new status if the order moved, or `None` when it was already settled
    /// (paid and cancelled are terminal; re-application is a no-op).
    pub fn settle(&mut self, outcome: PaymentOutcome, now: DateTime<Utc>) -> Option<OrderStatus> {
        if !self.is_pending() {
            return None;
        }

        self.status = match outcome {
            PaymentOutcome::Success => OrderStatus::Paid,
            PaymentOutcome::Failure => OrderStatus::Cancelled,
        };
        self.updated_at = now;
        Some(self.status)
    }
}
