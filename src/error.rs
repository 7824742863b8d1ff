use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::agent::AgentError;
use crate::routes::dashboard::DashboardError;
use crate::usage::UsageError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Daily limit reached.")]
    LimitReached,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("usage log error: {0}")]
    Usage(UsageError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("dashboard error: {0}")]
    Dashboard(#[from] DashboardError),
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl From<UsageError> for AppError {
    fn from(err: UsageError) -> Self {
        match err {
            UsageError::LimitReached { .. } => AppError::LimitReached,
            other => AppError::Usage(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::LimitReached => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Usage(_) | AppError::Agent(_) | AppError::Dashboard(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}
