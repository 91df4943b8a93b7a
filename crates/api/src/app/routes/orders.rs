use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use flashsale_core::{HoldId, OrderId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let hold_id: HoldId = match dto::parse_id(&body.hold_id, "hold") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.reservations.orders.create_order(hold_id).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::OrderResponse::from(order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.reservations.orders.order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::OrderResponse::from(order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
