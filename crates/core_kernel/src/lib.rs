//! Core Kernel - Foundational types and utilities for the school ledger
//!
//! This crate provides the building blocks used across the workspace:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Tenant scope for multi-school operation
//! - Port infrastructure shared by every adapter

pub mod money;
pub mod identifiers;
pub mod tenant;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{
    SchoolId, UserId, StudentId, AcademicYearId, ClassId, SchoolLevelId,
    FeeStructureId, FeeComponentId, AssignmentId, InvoiceId, InvoiceItemId,
    InventoryItemId, PaymentId, AllocationId,
};
pub use tenant::TenantContext;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
    OperationMetadata,
};
