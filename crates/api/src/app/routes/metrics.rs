use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use flashsale_infra::ServiceError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/logs", get(list_logs))
}

/// Every metrics event, most recent first. `?limit=N` keeps only the newest `N`.
pub async fn list_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LogsQuery>,
) -> axum::response::Response {
    match services.store.metrics_events(query.limit).await {
        Ok(events) => (StatusCode::OK, Json(dto::LogsResponse { events })).into_response(),
        Err(e) => errors::service_error_to_response(ServiceError::from(e)),
    }
}
