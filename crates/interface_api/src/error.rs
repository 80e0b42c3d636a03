//! API error handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_billing::BillingError;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {message}")]
    Conflict { code: &'static str, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<Vec<String>>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            code: "validation_error",
            message: message.into(),
            details: None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized".to_string(), None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None),
            ApiError::Validation { code, message, details } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message, details)
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let code = err.code();
        match err {
            BillingError::Validation(message) | BillingError::ScopeMismatch(message) => ApiError::Validation {
                code,
                message,
                details: None,
            },
            BillingError::InsufficientStock { .. } | BillingError::InvoiceLocked { .. } => ApiError::Conflict {
                code,
                message: err.to_string(),
            },
            BillingError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            BillingError::Storage(source) => {
                error!(error = %source, "Ledger storage failure");
                ApiError::Internal("Ledger storage is unavailable".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(permission) => {
                ApiError::Forbidden(format!("Missing permission: {}", permission))
            }
            AuthError::InvalidToken | AuthError::TokenExpired => ApiError::Unauthorized,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        ApiError::Validation {
            code: "validation_error",
            message: "Request validation failed".to_string(),
            details: Some(details),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{InventoryItemId, InvoiceId};
    use domain_billing::InvoiceStatus;

    fn status_of(err: BillingError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_billing_error_status_codes() {
        assert_eq!(status_of(BillingError::validation("bad")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(BillingError::scope_mismatch("class")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_of(BillingError::InsufficientStock {
                inventory_item_id: InventoryItemId::new(),
                requested: 4,
                available: 3,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::InvoiceLocked {
                invoice_id: InvoiceId::new(),
                status: InvoiceStatus::Void,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BillingError::not_found("Invoice", "x")), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        assert_eq!(
            ApiError::from(AuthError::TokenExpired).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::MissingPermission("billing:write".into()))
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }
}
