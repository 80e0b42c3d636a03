//! In-memory ledger adapter
//!
//! Keeps every school's ledger in process memory. Units of work are
//! serialized behind a single `tokio::sync::Mutex`: `begin` waits for the
//! lock, works on a copy of the state and swaps it in on commit. Dropping
//! the unit of work releases the lock and leaves the shared state as it was.
//!
//! Used by the service tests and by the API when configured with
//! `storage = "memory"`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    AcademicYearId, AdapterHealth, AssignmentId, Currency, DomainPort, FeeComponentId,
    FeeStructureId, HealthCheckResult, HealthCheckable, InventoryItemId, InvoiceId, InvoiceItemId,
    Money, PaymentId, PortError, SchoolId, StudentId,
};

use crate::fee_structure::{FeeStructure, StudentBillingContext, StudentFeeAssignment};
use crate::invoice::{Invoice, InvoiceItem};
use crate::payment::{Payment, PaymentAllocation};
use crate::ports::{InvoiceQuery, LedgerPort, LedgerUnitOfWork};
use crate::stock::InventoryStock;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    fee_structures: HashMap<FeeStructureId, FeeStructure>,
    assignments: Vec<StudentFeeAssignment>,
    contexts: HashMap<(StudentId, AcademicYearId), StudentBillingContext>,
    stock: HashMap<InventoryItemId, InventoryStock>,
    invoices: HashMap<InvoiceId, Invoice>,
    items: Vec<InvoiceItem>,
    payments: HashMap<PaymentId, Payment>,
    allocations: Vec<PaymentAllocation>,
    sequences: HashMap<(SchoolId, i32), u32>,
}

/// In-memory implementation of [`LedgerPort`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stock item, as the inventory module would
    pub async fn seed_stock(&self, stock: InventoryStock) {
        self.state.lock().await.stock.insert(stock.id, stock);
    }

    /// Registers a student's enrollment, as the enrollment module would
    pub async fn seed_student_context(&self, context: StudentBillingContext) {
        let key = (context.student_id, context.academic_year_id);
        self.state.lock().await.contexts.insert(key, context);
    }

    /// Current stock level of an item
    pub async fn stock_level(&self, id: InventoryItemId) -> Option<u32> {
        self.state.lock().await.stock.get(&id).map(|s| s.quantity_in_stock)
    }
}

impl DomainPort for InMemoryLedger {}

#[async_trait]
impl HealthCheckable for InMemoryLedger {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-ledger".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory adapter always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerPort for InMemoryLedger {
    async fn begin(&self, school_id: SchoolId) -> Result<Box<dyn LedgerUnitOfWork>, PortError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            school_id,
            guard,
            working,
        }))
    }
}

/// Unit of work over a private copy of the ledger state
pub struct InMemoryUnitOfWork {
    school_id: SchoolId,
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

impl InMemoryUnitOfWork {
    fn owns_invoice(&self, id: InvoiceId) -> bool {
        self.working
            .invoices
            .get(&id)
            .is_some_and(|i| i.school_id == self.school_id)
    }

    fn owns_payment(&self, id: PaymentId) -> bool {
        self.working
            .payments
            .get(&id)
            .is_some_and(|p| p.school_id == self.school_id)
    }

    fn stock_mut(&mut self, id: InventoryItemId) -> Result<&mut InventoryStock, PortError> {
        let school_id = self.school_id;
        self.working
            .stock
            .get_mut(&id)
            .filter(|s| s.school_id == school_id)
            .ok_or_else(|| PortError::not_found("InventoryItem", id))
    }

    fn sum_in(currency: Currency, amounts: impl Iterator<Item = Money>) -> Result<Money, PortError> {
        amounts
            .filter(|m| m.currency() == currency)
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(&m))
            .map_err(|e| PortError::internal(e.to_string()))
    }
}

#[async_trait]
impl LedgerUnitOfWork for InMemoryUnitOfWork {
    fn school_id(&self) -> SchoolId {
        self.school_id
    }

    async fn insert_fee_structure(&mut self, structure: &FeeStructure) -> Result<(), PortError> {
        if self.working.fee_structures.contains_key(&structure.id) {
            return Err(PortError::conflict(format!("Fee structure {} already exists", structure.id)));
        }
        self.working.fee_structures.insert(structure.id, structure.clone());
        Ok(())
    }

    async fn fee_structure(&mut self, id: FeeStructureId) -> Result<Option<FeeStructure>, PortError> {
        Ok(self
            .working
            .fee_structures
            .get(&id)
            .filter(|s| s.school_id == self.school_id)
            .cloned())
    }

    async fn insert_assignment(&mut self, assignment: &StudentFeeAssignment) -> Result<(), PortError> {
        let duplicate = self.working.assignments.iter().any(|a| {
            a.student_id == assignment.student_id
                && a.fee_structure_id == assignment.fee_structure_id
                && a.academic_year_id == assignment.academic_year_id
        });
        if duplicate {
            return Err(PortError::conflict(format!(
                "Student {} is already assigned fee structure {} for year {}",
                assignment.student_id, assignment.fee_structure_id, assignment.academic_year_id
            )));
        }
        self.working.assignments.push(assignment.clone());
        Ok(())
    }

    async fn assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError> {
        Ok(self
            .working
            .assignments
            .iter()
            .find(|a| a.id == id && a.school_id == self.school_id)
            .cloned())
    }

    async fn lock_assignment(&mut self, id: AssignmentId) -> Result<Option<StudentFeeAssignment>, PortError> {
        // Units of work are already serialized by the store guard
        self.assignment(id).await
    }

    async fn set_assignment_active(&mut self, id: AssignmentId, is_active: bool) -> Result<(), PortError> {
        let school_id = self.school_id;
        let assignment = self
            .working
            .assignments
            .iter_mut()
            .find(|a| a.id == id && a.school_id == school_id)
            .ok_or_else(|| PortError::not_found("StudentFeeAssignment", id))?;
        assignment.is_active = is_active;
        Ok(())
    }

    async fn assignments_for_structure(
        &mut self,
        fee_structure_id: FeeStructureId,
        academic_year_id: AcademicYearId,
    ) -> Result<Vec<StudentFeeAssignment>, PortError> {
        let mut found: Vec<_> = self
            .working
            .assignments
            .iter()
            .filter(|a| {
                a.school_id == self.school_id
                    && a.fee_structure_id == fee_structure_id
                    && a.academic_year_id == academic_year_id
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn student_context(
        &mut self,
        student_id: StudentId,
        academic_year_id: AcademicYearId,
    ) -> Result<Option<StudentBillingContext>, PortError> {
        Ok(self
            .working
            .contexts
            .get(&(student_id, academic_year_id))
            .filter(|c| c.school_id == self.school_id)
            .cloned())
    }

    async fn has_billed_fee_structure(
        &mut self,
        student_id: StudentId,
        fee_structure_id: FeeStructureId,
        component_ids: &[FeeComponentId],
    ) -> Result<bool, PortError> {
        let state = &self.working;
        Ok(state.items.iter().any(|item| {
            let references = item.fee_structure_id == Some(fee_structure_id)
                || item.fee_component_id.is_some_and(|c| component_ids.contains(&c));
            references
                && state.invoices.get(&item.invoice_id).is_some_and(|inv| {
                    inv.school_id == self.school_id
                        && inv.student_id == student_id
                        && inv.status.is_billable()
                })
        }))
    }

    async fn lock_inventory_item(&mut self, id: InventoryItemId) -> Result<Option<InventoryStock>, PortError> {
        Ok(self
            .working
            .stock
            .get(&id)
            .filter(|s| s.school_id == self.school_id)
            .cloned())
    }

    async fn try_decrement_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<bool, PortError> {
        let stock = self.stock_mut(id)?;
        if stock.quantity_in_stock < quantity {
            return Ok(false);
        }
        stock.quantity_in_stock -= quantity;
        Ok(true)
    }

    async fn increment_stock(&mut self, id: InventoryItemId, quantity: u32) -> Result<(), PortError> {
        let stock = self.stock_mut(id)?;
        stock.quantity_in_stock = stock
            .quantity_in_stock
            .checked_add(quantity)
            .ok_or_else(|| PortError::validation_field("stock level overflow", "quantity_in_stock"))?;
        Ok(())
    }

    async fn next_invoice_number(&mut self, year: i32) -> Result<String, PortError> {
        let seq = self.working.sequences.entry((self.school_id, year)).or_insert(0);
        *seq += 1;
        Ok(format!("INV-{}-{:06}", year, seq))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        let duplicate = self.working.invoices.values().any(|i| {
            i.school_id == invoice.school_id && i.invoice_number == invoice.invoice_number
        });
        if duplicate {
            return Err(PortError::conflict(format!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }
        self.working.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), PortError> {
        if !self.owns_invoice(item.invoice_id) {
            return Err(PortError::not_found("Invoice", item.invoice_id));
        }
        self.working.items.push(item.clone());
        Ok(())
    }

    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self
            .working
            .invoices
            .get(&id)
            .filter(|i| i.school_id == self.school_id)
            .cloned())
    }

    async fn find_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        self.lock_invoice(id).await
    }

    async fn invoice_items(&mut self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, PortError> {
        if !self.owns_invoice(invoice_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .items
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), PortError> {
        if !self.owns_invoice(invoice.id) {
            return Err(PortError::not_found("Invoice", invoice.id));
        }
        self.working.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn update_item(&mut self, item: &InvoiceItem) -> Result<(), PortError> {
        if !self.owns_invoice(item.invoice_id) {
            return Err(PortError::not_found("Invoice", item.invoice_id));
        }
        let slot = self
            .working
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| PortError::not_found("InvoiceItem", item.id))?;
        *slot = item.clone();
        Ok(())
    }

    async fn delete_item(&mut self, id: InvoiceItemId) -> Result<(), PortError> {
        let position = self
            .working
            .items
            .iter()
            .position(|i| i.id == id)
            .filter(|&idx| self.owns_invoice(self.working.items[idx].invoice_id))
            .ok_or_else(|| PortError::not_found("InvoiceItem", id))?;
        self.working.items.remove(position);
        Ok(())
    }

    async fn lock_open_invoices_for_student(&mut self, student_id: StudentId) -> Result<Vec<Invoice>, PortError> {
        let mut open: Vec<Invoice> = self
            .working
            .invoices
            .values()
            .filter(|i| i.school_id == self.school_id && i.student_id == student_id && i.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|i| (i.due_date, i.issue_date, i.created_at));
        Ok(open)
    }

    async fn list_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let mut found: Vec<Invoice> = self
            .working
            .invoices
            .values()
            .filter(|i| i.school_id == self.school_id && query.matches(i))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = query.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &PaymentAllocation) -> Result<(), PortError> {
        if !self.owns_payment(allocation.payment_id) {
            return Err(PortError::not_found("Payment", allocation.payment_id));
        }
        if !self.owns_invoice(allocation.invoice_id) {
            return Err(PortError::not_found("Invoice", allocation.invoice_id));
        }
        self.working.allocations.push(allocation.clone());
        Ok(())
    }

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self
            .working
            .payments
            .get(&id)
            .filter(|p| p.school_id == self.school_id)
            .cloned())
    }

    async fn allocations_for_payment(&mut self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>, PortError> {
        if !self.owns_payment(payment_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .allocations
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn allocations_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<PaymentAllocation>, PortError> {
        if !self.owns_invoice(invoice_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .allocations
            .iter()
            .filter(|a| a.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn sum_payments(&mut self, currency: Currency) -> Result<Money, PortError> {
        let school_id = self.school_id;
        Self::sum_in(
            currency,
            self.working
                .payments
                .values()
                .filter(|p| p.school_id == school_id)
                .map(|p| p.amount),
        )
    }

    async fn sum_allocations(&mut self, currency: Currency) -> Result<Money, PortError> {
        let amounts: Vec<Money> = self
            .working
            .allocations
            .iter()
            .filter(|a| self.owns_payment(a.payment_id))
            .map(|a| a.amount)
            .collect();
        Self::sum_in(currency, amounts.into_iter())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let InMemoryUnitOfWork { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn invoice(school_id: SchoolId, number: &str) -> Invoice {
        let date = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        Invoice::new(
            school_id,
            number.to_string(),
            StudentId::new(),
            Currency::KES,
            date,
            date,
            None,
            core_kernel::UserId::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let ledger = InMemoryLedger::new();
        let school = SchoolId::new();
        let inv = invoice(school, "INV-2026-000001");

        {
            let mut uow = ledger.begin(school).await.unwrap();
            uow.insert_invoice(&inv).await.unwrap();
        }

        let mut uow = ledger.begin(school).await.unwrap();
        assert!(uow.lock_invoice(inv.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let ledger = InMemoryLedger::new();
        let school = SchoolId::new();
        let inv = invoice(school, "INV-2026-000001");

        let mut uow = ledger.begin(school).await.unwrap();
        uow.insert_invoice(&inv).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = ledger.begin(school).await.unwrap();
        assert!(uow.lock_invoice(inv.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_other_school_rows_are_invisible() {
        let ledger = InMemoryLedger::new();
        let school = SchoolId::new();
        let inv = invoice(school, "INV-2026-000001");

        let mut uow = ledger.begin(school).await.unwrap();
        uow.insert_invoice(&inv).await.unwrap();
        uow.commit().await.unwrap();

        let mut other = ledger.begin(SchoolId::new()).await.unwrap();
        assert!(other.lock_invoice(inv.id).await.unwrap().is_none());
        assert!(other.list_invoices(&InvoiceQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoice_numbers_per_school_and_year() {
        let ledger = InMemoryLedger::new();
        let school = SchoolId::new();

        let mut uow = ledger.begin(school).await.unwrap();
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000001");
        assert_eq!(uow.next_invoice_number(2026).await.unwrap(), "INV-2026-000002");
        assert_eq!(uow.next_invoice_number(2027).await.unwrap(), "INV-2027-000001");
        uow.commit().await.unwrap();

        let mut other = ledger.begin(SchoolId::new()).await.unwrap();
        assert_eq!(other.next_invoice_number(2026).await.unwrap(), "INV-2026-000001");
    }

    #[tokio::test]
    async fn test_compare_and_decrement() {
        let ledger = InMemoryLedger::new();
        let school = SchoolId::new();
        let stock = InventoryStock::new(school, "Sweater", 3);
        let id = stock.id;
        ledger.seed_stock(stock).await;

        let mut uow = ledger.begin(school).await.unwrap();
        assert!(!uow.try_decrement_stock(id, 4).await.unwrap());
        assert!(uow.try_decrement_stock(id, 3).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(ledger.stock_level(id).await, Some(0));
    }
}
