//! Request handlers and the state and error types they share.

pub mod deployments;
pub mod templates;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use engine::{Deployer, EngineError, ErrorClass};
use serde_json::json;
use tracing::error;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub deployer: Arc<Deployer>,
}

impl AppState {
    pub fn new(deployer: Deployer) -> Self {
        Self { deployer: Arc::new(deployer) }
    }
}

/// An engine failure rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.class() {
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
            ErrorClass::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self.0 {
            EngineError::Validation { requirement, missing_fields } => json!({
                "error": self.0.to_string(),
                "requirement": requirement,
                "missing_fields": missing_fields,
            }),
            EngineError::Database(_) => {
                error!("database failure: {}", self.0);
                json!({"error": "internal database error"})
            }
            other => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("request failed: {other}");
                }
                json!({"error": other.to_string()})
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: EngineError) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn error_classes_map_to_statuses() {
        assert_eq!(status_of(EngineError::TemplateNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(EngineError::Validation { requirement: "smtp".into(), missing_fields: vec![] }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(EngineError::UpstreamProvisioning { operation: "credential create", status: None, message: "down".into() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(EngineError::DeadlineExceeded { operation: "deployment", after: std::time::Duration::from_secs(1) }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(EngineError::Binding { node: "n".into(), node_type: "t".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
