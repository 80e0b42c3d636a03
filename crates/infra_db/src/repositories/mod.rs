//! Row types for the ledger tables
//!
//! Each row struct derives `sqlx::FromRow` and converts into the matching
//! `domain_billing` type. Conversion fails with `DatabaseError::CorruptRow`
//! when a stored code (currency, status, method) is not recognised.

pub mod billing;

pub use billing::{
    AllocationRow, AssignmentRow, EnrollmentRow, FeeComponentRow, FeeStructureRow, InventoryItemRow,
    InvoiceItemRow, InvoiceRow, PaymentRow,
};
