use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::transaction::RefundRejection;
use crate::domain::withdrawal::InvalidTransition;
use crate::domain::PromoRejection;
use crate::payments::PaymentError;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    PromoRejected(PromoRejection),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PromoRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PreconditionFailed(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable error taxonomy exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::PromoRejected(_) => {
                "validation_error"
            }
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::Conflict(_) => "integrity_conflict",
            AppError::Provider(_) => "provider_error",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            AppError::Provider(_) => {
                "Payment provider is unavailable, please retry later".to_string()
            }
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Provider(_) | AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, code = self.code(), "request failed");
            }
            AppError::PreconditionFailed(_) | AppError::Conflict(_) => {
                tracing::warn!(error = %self, code = self.code(), "request rejected");
            }
            _ => {}
        }

        let body = match &self {
            AppError::PromoRejected(reason) => json!({
                "success": false,
                "error": reason.to_string(),
                "reason": reason.code(),
                "code": self.code(),
                "status": status.as_u16(),
            }),
            _ => json!({
                "error": self.public_message(),
                "code": self.code(),
                "status": status.as_u16(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Conflict(what),
            RepositoryError::Corrupt(what) => {
                AppError::Database(format!("corrupt record: {}", what))
            }
            RepositoryError::Database(what) => AppError::Database(what),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::from(err).into()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<PromoRejection> for AppError {
    fn from(reason: PromoRejection) -> Self {
        AppError::PromoRejected(reason)
    }
}

impl From<RefundRejection> for AppError {
    fn from(err: RefundRejection) -> Self {
        AppError::PreconditionFailed(err.to_string())
    }
}

impl From<InvalidTransition> for AppError {
    fn from(err: InvalidTransition) -> Self {
        AppError::PreconditionFailed(err.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::Provider(err.to_string())
    }
}
