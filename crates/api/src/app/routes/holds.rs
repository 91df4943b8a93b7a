use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use flashsale_core::{HoldId, ProductId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_hold))
        .route("/release-expired", post(release_expired))
        .route("/:id", get(get_hold))
        .route("/:id/release", post(release_hold))
}

pub async fn create_hold(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateHoldRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&body.product_id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let quantity = match dto::parse_quantity(body.quantity) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.reservations.holds.create_hold(product_id, quantity).await {
        Ok(hold) => (StatusCode::CREATED, Json(dto::HoldCreatedResponse::from(&hold))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_hold(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let hold_id: HoldId = match dto::parse_id(&id, "hold") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.reservations.holds.hold(hold_id).await {
        Ok(hold) => (StatusCode::OK, Json(dto::HoldResponse::from(hold))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Idempotent: releasing a used or already released hold returns it unchanged.
pub async fn release_hold(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let hold_id: HoldId = match dto::parse_id(&id, "hold") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.reservations.holds.release_hold(hold_id).await {
        Ok(hold) => (StatusCode::OK, Json(dto::HoldResponse::from(hold))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn release_expired(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.reservations.sweeper.release_expired_holds().await {
        Ok(outcome) => (StatusCode::OK, Json(dto::SweepResponse::from(outcome))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
