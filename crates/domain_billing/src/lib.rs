//! Billing Domain - School Fee Ledger
//!
//! This crate implements the billing ledger of a multi-tenant school
//! administration system: fee structures are resolved into invoices, invoice
//! items may reserve inventory stock, payments are allocated across a
//! student's outstanding invoices, and invoice status and aging are derived
//! from live figures.
//!
//! # Flow
//!
//! ```text
//! FeeStructure ──resolve──▶ BillableLine ──build──▶ Invoice + InvoiceItems
//!                                                       │        │
//!                                   Payment ──allocate──┘        └── InventoryStock
//!                                                       │
//!                                          recompute_status / AgingReport
//! ```
//!
//! # Invariants
//!
//! - `Invoice::total_amount` equals the sum of its items' `total_price`
//! - `Invoice::paid_amount` equals the sum of its allocations
//! - allocations of a payment never exceed the payment amount
//! - stock never goes below zero; linked items hold their quantity
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{LedgerServices, memory::InMemoryLedger};
//!
//! let services = LedgerServices::new(Arc::new(InMemoryLedger::new()));
//! let report = services.invoices.generate_invoices(&ctx, request).await?;
//! let receipt = services.payments.record_payment(&ctx, payment, today).await?;
//! ```

pub mod fee_structure;
pub mod invoice;
pub mod stock;
pub mod payment;
pub mod allocation;
pub mod aging;
pub mod ports;
pub mod memory;
pub mod services;
pub mod error;

pub use fee_structure::{
    resolve_lines, BillableLine, FeeComponent, FeeFrequency, FeeScope, FeeStructure,
    StudentBillingContext, StudentFeeAssignment,
};
pub use invoice::{
    recompute_status, Invoice, InvoiceDetail, InvoiceItem, InvoiceStatus, ItemPatch, NewInvoiceItem,
};
pub use stock::{InventoryStock, StockAdjustment, StockChange};
pub use payment::{
    Payment, PaymentAllocation, PaymentDetail, PaymentMethod, PaymentReceipt, PaymentTarget,
    RecordPaymentRequest,
};
pub use allocation::{waterfall, AllocationLine, AllocationPlan, OpenBalance};
pub use aging::{AgingBucket, AgingBucketTotal, AgingReport, DashboardStats, InvoiceSummary};
pub use ports::{InvoiceQuery, LedgerPort, LedgerUnitOfWork};
pub use services::{
    AssignFeeRequest, CreateFeeStructureRequest, CreateInvoiceRequest, FeeSetupService,
    GenerateInvoicesRequest, GenerationFailure, GenerationReport, InvoiceService, LedgerServices,
    NewFeeComponent, PaymentService, ReportingService,
};
pub use error::BillingError;
