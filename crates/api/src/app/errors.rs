use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use flashsale_core::DomainError;
use flashsale_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e @ DomainError::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, e.code(), e.to_string())
        }
        ServiceError::Domain(e) => {
            tracing::info!(error = %e, code = e.code(), "request rejected");
            json_error(StatusCode::BAD_REQUEST, e.code(), e.to_string())
        }
        ServiceError::Contention(msg) => {
            tracing::warn!(error = %msg, "request lost to contention");
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        e @ ServiceError::OrderNotFound(_) => {
            tracing::error!(error = %e, "payment notification failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "order_not_found", e.to_string())
        }
        e @ ServiceError::Store(_) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        e @ ServiceError::Lease(_) => {
            tracing::error!(error = %e, "lease failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "lease_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashsale_core::OrderId;

    #[test]
    fn rejections_map_to_client_errors() {
        let res = service_error_to_response(DomainError::HoldExpired.into());
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = service_error_to_response(DomainError::not_found("Hold").into());
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn contention_is_a_conflict() {
        let res = service_error_to_response(ServiceError::Contention("lock timeout".into()));
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_order_is_a_server_error() {
        let res = service_error_to_response(ServiceError::OrderNotFound(OrderId::new()));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
