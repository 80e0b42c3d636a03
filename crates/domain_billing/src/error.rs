//! Billing domain errors

use thiserror::Error;

use core_kernel::{InventoryItemId, InvoiceId, MoneyError, PortError};

use crate::invoice::InvoiceStatus;

/// Errors that can occur in the billing ledger
///
/// Every variant carries enough detail to render a user-facing message.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Malformed input, rejected before any transaction opens
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fee structure or assignment scope is inconsistent with the student
    #[error("Scope mismatch: {0}")]
    ScopeMismatch(String),

    /// A stock decrement would take an inventory item below zero
    #[error("Insufficient stock for {inventory_item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        inventory_item_id: InventoryItemId,
        requested: u32,
        available: u32,
    },

    /// Mutation attempted on a PAID, VOID or CANCELLED invoice
    #[error("Invoice {invoice_id} is locked (status {status})")]
    InvoiceLocked {
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    },

    /// Referenced entity is missing or outside the tenant scope
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Infrastructure failure that is not a constraint violation
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn scope_mismatch(message: impl Into<String>) -> Self {
        BillingError::ScopeMismatch(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Short machine-readable code, used in API responses and batch reports
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation_error",
            BillingError::ScopeMismatch(_) => "scope_mismatch",
            BillingError::InsufficientStock { .. } => "insufficient_stock",
            BillingError::InvoiceLocked { .. } => "invoice_locked",
            BillingError::NotFound { .. } => "not_found",
            BillingError::Storage(_) => "storage_error",
        }
    }
}

impl From<MoneyError> for BillingError {
    fn from(error: MoneyError) -> Self {
        BillingError::Validation(error.to_string())
    }
}

/// Constraint violations surface as domain errors, never as raw storage errors
impl From<PortError> for BillingError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, field } => match field {
                Some(field) => BillingError::Validation(format!("{}: {}", field, message)),
                None => BillingError::Validation(message),
            },
            PortError::Conflict { message } => BillingError::Validation(message),
            other => BillingError::Storage(other),
        }
    }
}
