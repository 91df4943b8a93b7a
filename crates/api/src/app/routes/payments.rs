use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::Value as JsonValue;

use flashsale_core::OrderId;
use flashsale_infra::PaymentNotification;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Provider callback. Safe to deliver any number of times per idempotency key, and
/// before the order it names is visible.
pub async fn payment_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(raw): Json<JsonValue>,
) -> axum::response::Response {
    let body: dto::PaymentWebhookRequest = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
    };
    if body.idempotency_key.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "idempotency_key cannot be empty",
        );
    }
    let order_id: OrderId = match dto::parse_id(&body.order_id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let outcome = match dto::parse_payment_status(&body.status) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let notification = PaymentNotification {
        idempotency_key: body.idempotency_key,
        order_id,
        outcome,
        payload: raw,
    };

    match services.reservations.payments.apply_outcome(&notification).await {
        Ok(receipt) => (StatusCode::OK, Json(dto::PaymentWebhookResponse::from(receipt))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
