use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use flashsale_core::{DomainError, OrderId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
        }
    }
}

impl core::str::FromStr for IdempotencyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(IdempotencyStatus::Processing),
            "completed" => Ok(IdempotencyStatus::Completed),
            other => Err(DomainError::validation(format!(
                "unknown idempotency status: {other}"
            ))),
        }
    }
}

/// Ledger entry for one payment notification key.
///
/// Created on first sight of a key and completed once the order mutation commits.
/// Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub order_id: OrderId,
    pub status: IdempotencyStatus,
    /// Raw notification body as delivered.
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn processing(
        key: impl Into<String>,
        order_id: OrderId,
        payload: JsonValue,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            order_id,
            status: IdempotencyStatus::Processing,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    pub fn complete(&mut self, order_id: OrderId, now: DateTime<Utc>) {
        self.order_id = order_id;
        self.status = IdempotencyStatus::Completed;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn processing_then_completed() {
        let now = Utc::now();
        let order_id = OrderId::new();
        let mut record =
            IdempotencyRecord::processing("key-1", order_id, json!({"status": "success"}), now);
        assert!(!record.is_completed());

        record.complete(order_id, now);
        assert!(record.is_completed());
        assert_eq!(record.payload["status"], "success");
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [IdempotencyStatus::Processing, IdempotencyStatus::Completed] {
            assert_eq!(s.as_str().parse::<IdempotencyStatus>().unwrap(), s);
        }
    }
}
