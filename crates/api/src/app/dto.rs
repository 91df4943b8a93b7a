use std::str::FromStr;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{HoldId, OrderId, ProductId};
use flashsale_infra::{SettlementReceipt, SweepOutcome};
use flashsale_inventory::{Hold, MetricsEvent, Order, OrderStatus, PaymentOutcome, Product};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub hold_id: String,
}

/// Provider notification body. Unknown fields are kept in the raw payload only.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    pub idempotency_key: String,
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price: u64,
    pub stock: i64,
    pub available_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductResponse {
    pub fn new(product: Product, available_stock: i64) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            available_stock,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldCreatedResponse {
    pub hold_id: HoldId,
    pub expires_at: DateTime<Utc>,
}

impl From<&Hold> for HoldCreatedResponse {
    fn from(hold: &Hold) -> Self {
        Self {
            hold_id: hold.id,
            expires_at: hold.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub hold_id: HoldId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            hold_id: hold.id,
            product_id: hold.product_id,
            quantity: hold.quantity,
            expires_at: hold.expires_at,
            used_at: hold.used_at,
            released_at: hold.released_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub hold_id: HoldId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub total_price: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            hold_id: order.hold_id,
            product_id: order.product_id,
            quantity: order.quantity,
            total_price: order.total_price,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentWebhookResponse {
    pub message: &'static str,
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub replayed: bool,
}

impl From<SettlementReceipt> for PaymentWebhookResponse {
    fn from(receipt: SettlementReceipt) -> Self {
        Self {
            message: receipt.message,
            order_id: receipt.order_id,
            order_status: receipt.order_status,
            replayed: receipt.replayed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub released_count: u64,
    pub skipped: bool,
}

impl From<SweepOutcome> for SweepResponse {
    fn from(outcome: SweepOutcome) -> Self {
        Self {
            released_count: outcome.released(),
            skipped: matches!(outcome, SweepOutcome::Skipped),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub events: Vec<MetricsEvent>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    raw.trim().parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

/// Quantities arrive as JSON integers; only 1..=u32::MAX is meaningful.
pub fn parse_quantity(quantity: i64) -> Result<u32, axum::response::Response> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "quantity must be a positive integer",
            )
        })
}

pub fn parse_payment_status(status: &str) -> Result<PaymentOutcome, axum::response::Response> {
    match status.trim().to_lowercase().as_str() {
        "success" | "succeeded" | "paid" => Ok(PaymentOutcome::Success),
        "failed" | "failure" => Ok(PaymentOutcome::Failure),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: success, failed",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_positive_and_fit() {
        assert_eq!(parse_quantity(3).ok(), Some(3));
        assert!(parse_quantity(0).is_err());
        assert!(parse_quantity(-1).is_err());
        assert!(parse_quantity(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn provider_status_spellings() {
        assert_eq!(parse_payment_status("success").ok(), Some(PaymentOutcome::Success));
        assert_eq!(parse_payment_status("FAILED").ok(), Some(PaymentOutcome::Failure));
        assert_eq!(parse_payment_status("failure").ok(), Some(PaymentOutcome::Failure));
        assert!(parse_payment_status("pending").is_err());
    }

    #[test]
    fn ids_are_validated() {
        assert!(parse_id::<HoldId>("not-a-uuid", "hold").is_err());
        let id = HoldId::new();
        assert_eq!(parse_id::<HoldId>(&id.to_string(), "hold").ok(), Some(id));
    }
}
