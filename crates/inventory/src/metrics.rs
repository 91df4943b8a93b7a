//! Append-only metrics facts.
//!
//! Every state-changing operation writes one of these inside its own transaction, so
//! a rollback removes the fact together with the change it describes. The core never
//! reads them back; they exist for an external observability consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use flashsale_core::{DomainError, HoldId, MetricsEventId, OrderId, ProductId};

use crate::hold::ReleaseReason;

/// Type tag + structured payload.
///
/// Serializes as `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricsEventKind {
    HoldCreated {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
        available_stock_after: i64,
    },
    HoldReleased {
        hold_id: HoldId,
        product_id: ProductId,
        quantity: u32,
        reason: ReleaseReason,
    },
    OrderPaid {
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    },
    OrderCancelled {
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    },
    HoldsBatchReleased {
        count: u64,
    },
}

impl MetricsEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            MetricsEventKind::HoldCreated { .. } => "hold_created",
            MetricsEventKind::HoldReleased { .. } => "hold_released",
            MetricsEventKind::OrderPaid { .. } => "order_paid",
            MetricsEventKind::OrderCancelled { .. } => "order_cancelled",
            MetricsEventKind::HoldsBatchReleased { .. } => "holds_batch_released",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub id: MetricsEventId,
    #[serde(flatten)]
    pub kind: MetricsEventKind,
    pub created_at: DateTime<Utc>,
}

impl MetricsEvent {
    pub fn new(kind: MetricsEventKind, now: DateTime<Utc>) -> Self {
        Self {
            id: MetricsEventId::new(),
            kind,
            created_at: now,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// The structured payload without its type tag (for column-per-field storage).
    pub fn payload(&self) -> Result<JsonValue, DomainError> {
        let mut tagged = serde_json::to_value(&self.kind)
            .map_err(|e| DomainError::validation(format!("metrics payload: {e}")))?;
        Ok(tagged
            .get_mut("payload")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Null))
    }

    /// Rebuild an event from its stored type tag and payload.
    pub fn from_parts(
        id: MetricsEventId,
        event_type: &str,
        payload: JsonValue,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let kind = serde_json::from_value(serde_json::json!({
            "type": event_type,
            "payload": payload,
        }))
        .map_err(|e| DomainError::validation(format!("metrics event {event_type}: {e}")))?;

        Ok(Self {
            id,
            kind,
            created_at,
        })
    }
}
