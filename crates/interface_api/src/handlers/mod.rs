//! Request handlers
//!
//! Handlers read the [`core_kernel::TenantContext`] placed by the auth
//! middleware, check the caller's permission, convert the request body and
//! call one ledger service. The business date (`today`) is read here, once
//! per request.

pub mod health;
pub mod fee_structures;
pub mod invoices;
pub mod payments;
pub mod reports;

use axum::{extract::rejection::JsonRejection, Json};
use chrono::{NaiveDate, Utc};
use validator::Validate;

use crate::error::ApiError;

/// The business date for this request
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Unwraps a JSON body and runs its field validation
pub(crate) fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    Ok(body)
}
