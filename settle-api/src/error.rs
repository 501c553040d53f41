use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use settle_core::OrderError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Order(err) => match err {
                OrderError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                OrderError::Unauthorized => StatusCode::UNAUTHORIZED,
                OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::Conflict(_) => StatusCode::CONFLICT,
                OrderError::Gateway(_) => StatusCode::BAD_GATEWAY,
                OrderError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                OrderError::Internal(_)
                | OrderError::ReconciliationRequired { .. }
                | OrderError::ChargeNotRecorded { .. }
                | OrderError::Store(_)
                | OrderError::LockStore(_)
                | OrderError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error_message = if status.is_server_error() {
            tracing::error!("{} {}: {}", status.as_u16(), status.canonical_reason().unwrap_or(""), self);
            match status {
                StatusCode::BAD_GATEWAY => "Payment provider error".to_string(),
                StatusCode::GATEWAY_TIMEOUT => "Request deadline exceeded".to_string(),
                _ => "Internal Server Error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::{ConflictKind, OrderId, Phase};

    #[test]
    fn test_order_errors_map_to_statuses() {
        let cases = [
            (OrderError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (OrderError::Unauthorized, StatusCode::UNAUTHORIZED),
            (OrderError::NotFound, StatusCode::NOT_FOUND),
            (OrderError::Conflict(ConflictKind::PaymentInProgress), StatusCode::CONFLICT),
            (OrderError::Gateway("declined".into()), StatusCode::BAD_GATEWAY),
            (OrderError::DeadlineExceeded(Phase::Charge), StatusCode::GATEWAY_TIMEOUT),
            (
                OrderError::ReconciliationRequired {
                    order_id: OrderId::new("o-1"),
                    provider_transaction_id: "sbx_1".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                OrderError::ChargeNotRecorded {
                    order_id: OrderId::new("o-1"),
                    provider_transaction_id: "sbx_1".into(),
                    source: Box::new(OrderError::DeadlineExceeded(Phase::Commit)),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
