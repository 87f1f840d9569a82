use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use error_stack::Report;
use serde::Serialize;

use crate::error::{AnalyticsError, ServiceError};

/// API-layer error type
#[derive(Debug)]
pub enum ApiError {
    /// 400 - Bad request (invalid input, insufficient data)
    BadRequest(String),

    /// 404 - Unknown stock or no stored prices
    NotFound(String),

    /// 422 - Input is well formed but the result is not computable
    Unprocessable(String),

    /// 500 - Internal error
    Internal(String),

    /// 502 - Market data provider failed
    BadGateway(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "not_computable", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg),
        };

        let body = ErrorBody {
            error: error_type.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<Report<ServiceError>> for ApiError {
    fn from(report: Report<ServiceError>) -> Self {
        let message = report.current_context().to_string();
        match report.current_context() {
            ServiceError::NotFound { .. } | ServiceError::NoData => ApiError::NotFound(message),
            ServiceError::AlreadyExists { .. }
            | ServiceError::InvalidRequest { .. }
            | ServiceError::InsufficientData { .. } => ApiError::BadRequest(message),
            ServiceError::Analytics => match report.downcast_ref::<AnalyticsError>() {
                Some(e @ AnalyticsError::DivisionByZero { .. }) => {
                    ApiError::Unprocessable(e.to_string())
                }
                Some(e) => ApiError::BadRequest(e.to_string()),
                None => {
                    tracing::error!(error = ?report, "analytics failure without cause");
                    ApiError::Internal(message)
                }
            },
            ServiceError::Provider => {
                tracing::warn!(error = ?report, "market data provider failed");
                ApiError::BadGateway(message)
            }
            ServiceError::Storage => {
                tracing::error!(error = ?report, "storage failure");
                ApiError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(report: Report<ServiceError>) -> StatusCode {
        ApiError::from(report).into_response().status()
    }

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(
            status_of(Report::new(ServiceError::NotFound {
                entity: "stock 1".into()
            })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(Report::new(ServiceError::NoData)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Report::new(ServiceError::AlreadyExists {
                symbol: "AAPL".into()
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Report::new(ServiceError::Provider)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(Report::new(ServiceError::Storage)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn analytics_errors_use_their_cause() {
        let zero = Report::new(AnalyticsError::DivisionByZero { index: 3 })
            .change_context(ServiceError::Analytics);
        assert_eq!(status_of(zero), StatusCode::UNPROCESSABLE_ENTITY);

        let empty = Report::new(AnalyticsError::EmptySeries).change_context(ServiceError::Analytics);
        assert_eq!(status_of(empty), StatusCode::BAD_REQUEST);
    }
}
