use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::{json, Value};
use shared::query::StayParamError;
use shared::DomainError;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    GatewayUnavailable { message: String, details: String },

    #[error("{message}")]
    GatewayRejected { message: String, response: Value },

    #[error(transparent)]
    Database(DieselError),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::bb8::RunError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound("Not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::Conflict(unique_violation_message(info.constraint_name()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
                AppError::Conflict(
                    "Another booking for this listing was made at the same time, please retry"
                        .to_string(),
                )
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                AppError::Validation(info.message().to_string())
            }
            other => AppError::Database(other),
        }
    }
}

impl From<StayParamError> for AppError {
    fn from(err: StayParamError) -> Self {
        match err {
            StayParamError::Invalid(domain) => AppError::Domain(domain),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        let problems: Vec<String> = report
            .iter()
            .map(|(path, error)| format!("{}: {}", path, error))
            .collect();
        AppError::Validation(problems.join("; "))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::GatewayUnavailable {
            message: "Failed to contact payment gateway".to_string(),
            details: err.to_string(),
        }
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(name) if name.starts_with("bookings_") => {
            "A booking for this listing with the same dates already exists".to_string()
        }
        Some(name) if name.starts_with("reviews_") => {
            "This booking has already been reviewed".to_string()
        }
        _ => "Duplicate record".to_string(),
    }
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Domain(e) if e.is_permission() => StatusCode::FORBIDDEN,
            AppError::Domain(e) if e.is_conflict() => StatusCode::CONFLICT,
            AppError::Domain(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::GatewayUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::GatewayRejected { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::GatewayUnavailable { message, details } => {
                json!({ "error": message, "details": details })
            }
            AppError::GatewayRejected { message, response } => {
                json!({ "error": message, "response": response })
            }
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                tracing::error!(error.cause_chain = ?self, error.message = %self, "Unexpected error");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
