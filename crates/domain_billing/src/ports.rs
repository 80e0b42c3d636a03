//! Ledger Ports
//!
//! The billing services never talk to a database directly. They open a
//! [`LedgerUnitOfWork`] through the [`LedgerPort`], perform every read that
//! informs a decision and every write inside it, and commit once.
//!
//! # Architecture
//!
//! - **PostgreSQL adapter** (`infra_db`): a unit of work wraps one database
//!   transaction; `lock_*` reads use `SELECT … FOR UPDATE`.
//! - **In-memory adapter** ([`crate::memory`]): units of work are serialized
//!   behind a mutex and apply a working copy on commit.
//!
//! Dropping a unit of work without calling [`LedgerUnitOfWork::commit`]
//! discards everything it wrote.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut uow = ledger.begin(ctx.school_id).await?;
//! let mut invoice = uow.lock_invoice(invoice_id).await?.ok_or(...)?;
//! invoice.void()?;
//! uow.update_invoice(&invoice).await?;
//! uow.commit().await?;
//! ```
//!
//! Every unit of work is scoped to one school. Rows belonging to another
//! school are reported as absent.

use async_trait::async_trait;

use core_kernel::{
    AcademicYearId, AssignmentId, Currency, DomainPort, FeeComponentId, FeeStructureId,
    HealthCheckable, InventoryItemId, InvoiceId, InvoiceItemId, Money, PaymentId, PortError,
    SchoolId, StudentId,
};

use crate::fee_structure::{FeeStructure, StudentBillingContext, StudentFeeAssignment};
use crate::invoice::{Invoice, InvoiceItem, InvoiceStatus};
use crate::payment::{Payment, PaymentAllocation};
use crate::stock::InventoryStock;

/// Filter for invoice listings
///
/// Results are ordered newest issue date first.
#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub student_id: Option<StudentId>,
    /// Empty means every status
    pub statuses: Vec<InvoiceStatus>,
    pub limit: Option<u32>,
}

impl InvoiceQuery {
    pub fn for_student(student_id: StudentId) -> Self {
        Self {
            student_id: Some(student_id),
            ..Default::default()
        }
    }

    pub fn open() -> Self {
        Self {
            statuses: InvoiceStatus::OPEN.to_vec(),
            ..Default::default()
        }
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(student_id) = self.student_id {
            if invoice.student_id != student_id {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&invoice.status)
    }
}

/// Entry point to ledger storage
#[async_trait]
pub trait LedgerPort: DomainPort + HealthCheckable {
    /// Opens a unit of work scoped to one school
    async fn begin(&self, school_id: SchoolId) -> Result<Box<dyn LedgerUnitOfWork>, PortError>;
}

/// One atomic unit of ledger work
///
/// All methods operate inside the same transaction. `lock_*` methods take a
/// row lock held until commit or drop.
#[async_trait]
pub trait LedgerUnitOfWork: Send {
    /// The school this unit of work is scoped to
    fn school_id(&self) -> SchoolId;

    // ========================================================================
    // Fee setup
    // ========================================================================

    /// Persists a fee structure with its components
    async fn insert_fee_structure(&mut self, structure: &FeeStructure) -> Result<(), PortError>;

    async fn fee_structure(&mut self, id: FeeStructureId) -> Result<Option<FeeStructure>, PortError>;

    /// Persists an assignment
    ///
    /// Returns `PortError::Conflict` when the student already has an
    /// assignment to the same structure for the same year.
    async fn insert_assignment(&mut self, assignment: &StudentFeeAssignment) -> Result<(), PortError>;

    async fn assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError>;

    /// Reads and locks an assignment until the unit of work ends
    ///
    /// Generation takes this lock before checking whether the student is
    /// already billed, so concurrent runs over the same structure bill a
    /// student at most once.
    async fn lock_assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError>;

    async fn set_assignment_active(&mut self, id: AssignmentId, is_active: bool) -> Result<(), PortError>;

    /// All assignments (active or not) of a structure in a year, oldest first
    async fn assignments_for_structure(
        &mut self,
        fee_structure_id: FeeStructureId,
        academic_year_id: AcademicYearId,
    ) -> Result<Vec<StudentFeeAssignment>, PortError>;

    /// The student's class and level for a year
    async fn student_context(
        &mut self,
        student_id: StudentId,
        academic_year_id: AcademicYearId,
    ) -> Result<Option<StudentBillingContext>, PortError>;

    /// Whether an item on a live (not void or cancelled) invoice of the
    /// student references the structure or any of its components
    async fn has_billed_fee_structure(
        &mut self,
        student_id: StudentId,
        fee_structure_id: FeeStructureId,
        component_ids: &[FeeComponentId],
    ) -> Result<bool, PortError>;

    // ========================================================================
    // Inventory
    // ========================================================================

    /// Reads and locks a stock row
    async fn lock_inventory_item(&mut self, id: InventoryItemId) -> Result<Option<InventoryStock>, PortError>;

    /// Compare-and-decrement; returns false when stock is insufficient
    async fn try_decrement_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<bool, PortError>;

    async fn increment_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<(), PortError>;

    // ========================================================================
    // Invoices
    // ========================================================================

    /// Allocates the next `INV-{year}-{seq}` number for this school
    async fn next_invoice_number(&mut self, year: i32) -> Result<String, PortError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError>;

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), PortError>;

    /// Reads and locks an invoice header
    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Reads an invoice header without locking it
    async fn find_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Items of an invoice in creation order
    async fn invoice_items(&mut self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, PortError>;

    /// Writes totals, status, dates and notes back to the header
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError>;

    async fn update_item(&mut self, item: &InvoiceItem) -> Result<(), PortError>;

    async fn delete_item(&mut self, id: InvoiceItemId) -> Result<(), PortError>;

    /// Locks the student's open invoices, ordered by due date then issue date
    async fn lock_open_invoices_for_student(&mut self, student_id: StudentId) -> Result<Vec<Invoice>, PortError>;

    async fn list_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError>;

    // ========================================================================
    // Payments
    // ========================================================================

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError>;

    async fn insert_allocation(&mut self, allocation: &PaymentAllocation) -> Result<(), PortError>;

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError>;

    async fn allocations_for_payment(&mut self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError>;

    async fn allocations_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<PaymentAllocation>, PortError>;

    /// Σ payment amounts in `currency`
    async fn sum_payments(&mut self, currency: Currency) -> Result<Money, PortError>;

    /// Σ allocation amounts in `currency`
    async fn sum_allocations(&mut self, currency: Currency) -> Result<Money, PortError>;

    // ========================================================================
    // Transaction control
    // ========================================================================

    /// Makes every write durable
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}
