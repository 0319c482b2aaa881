use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::engine::{ExecutionId, ExecutionState};

pub type Result<T> = std::result::Result<T, KpiError>;

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("remote query {state} ({execution_id}): {reason}")]
    RemoteQueryFailure {
        execution_id: ExecutionId,
        state: ExecutionState,
        reason: String,
    },
    #[error("remote query {execution_id} still running after {}s", waited.as_secs())]
    RemoteTimeout {
        execution_id: ExecutionId,
        waited: Duration,
    },
    #[error("remote engine denied access: {0}")]
    RemoteAccessDenied(String),
    #[error("remote engine throttled the request: {0}")]
    RemoteThrottling(String),
    #[error("result row has {found} cells, expected {expected}")]
    ResultShape { expected: usize, found: usize },
    #[error("remote engine error: {0}")]
    Remote(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KpiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            KpiError::Validation(_) => StatusCode::BAD_REQUEST,
            KpiError::RemoteAccessDenied(_) => StatusCode::FORBIDDEN,
            KpiError::RemoteTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            KpiError::RemoteThrottling(_) => StatusCode::SERVICE_UNAVAILABLE,
            KpiError::Remote(_) => StatusCode::BAD_GATEWAY,
            KpiError::Config(_)
            | KpiError::RemoteQueryFailure { .. }
            | KpiError::ResultShape { .. }
            | KpiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for KpiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
