//! Request and response bodies
//!
//! Requests arrive with raw UUIDs and currency/status codes; each request
//! type converts itself into the matching `domain_billing` input. Responses
//! flatten `Money` into an amount plus a currency code.

pub mod fee_structures;
pub mod invoices;
pub mod payments;
pub mod reports;

use core_kernel::Currency;

use crate::error::ApiError;

pub(crate) fn parse_currency(code: &str) -> Result<Currency, ApiError> {
    code.parse()
        .map_err(|_| ApiError::validation(format!("Unsupported currency: {}", code)))
}
