use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use flashsale_core::{DomainError, ProductId};
use flashsale_infra::ServiceError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:id", get(get_product))
}

/// Product details with live availability (served from the stock cache when warm).
pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };

    let product = match services.store.product(product_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return errors::service_error_to_response(DomainError::not_found("Product").into());
        }
        Err(e) => return errors::service_error_to_response(ServiceError::from(e)),
    };

    let available = match services.reservations.ledger.available_stock(product_id).await {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(dto::ProductResponse::new(product, available)),
    )
        .into_response()
}
