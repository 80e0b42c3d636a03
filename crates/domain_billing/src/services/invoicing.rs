//! Invoice building and item mutation

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AcademicYearId, Currency, FeeStructureId, InventoryItemId, InvoiceId, InvoiceItemId, Money,
    StudentId, TenantContext,
};

use crate::error::BillingError;
use crate::fee_structure::{resolve_lines, FeeStructure, StudentFeeAssignment};
use crate::invoice::{validate_dates, Invoice, InvoiceDetail, InvoiceItem, ItemPatch, NewInvoiceItem};
use crate::ports::{InvoiceQuery, LedgerPort, LedgerUnitOfWork};
use crate::stock::{reconcile, StockAdjustment};

use super::{apply_stock_adjustments, load_detail, lock_invoice};

/// Options for batch invoice generation
#[derive(Debug, Clone)]
pub struct GenerateInvoicesRequest {
    pub fee_structure_id: FeeStructureId,
    pub academic_year_id: AcademicYearId,
    /// Restrict the run to these students
    pub student_ids: Option<Vec<StudentId>>,
    pub dry_run: bool,
    pub overwrite_existing: bool,
    pub include_inactive_assignments: bool,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl GenerateInvoicesRequest {
    pub fn new(
        fee_structure_id: FeeStructureId,
        academic_year_id: AcademicYearId,
        issue_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            fee_structure_id,
            academic_year_id,
            student_ids: None,
            dry_run: false,
            overwrite_existing: false,
            include_inactive_assignments: false,
            issue_date,
            due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub student_id: StudentId,
    pub reason: String,
}

/// Outcome of a generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Invoices created, or that would be created on a dry run
    pub created: usize,
    pub skipped: usize,
    pub failed: Vec<GenerationFailure>,
    /// Σ totals of the created invoices
    pub total_amount: Money,
    pub dry_run: bool,
    /// Empty on a dry run
    pub invoice_ids: Vec<InvoiceId>,
}

/// Input for an ad-hoc invoice
#[derive(Debug, Clone)]
pub struct CreateInvoiceRequest {
    pub student_id: StudentId,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<NewInvoiceItem>,
}

enum StudentOutcome {
    Skipped,
    Billed { invoice_id: Option<InvoiceId>, total: Money },
}

/// Builds invoices and edits their items
#[derive(Clone)]
pub struct InvoiceService {
    ledger: Arc<dyn LedgerPort>,
}

impl InvoiceService {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    /// Bills every assignment of a fee structure in an academic year
    ///
    /// Each student is billed in its own unit of work; a failure for one
    /// student is recorded in the report and the run continues. A dry run
    /// validates scope and stock for every student against one uncommitted
    /// unit of work and writes nothing.
    #[instrument(
        skip(self, ctx, request),
        fields(
            school_id = %ctx.school_id,
            correlation_id = ctx.correlation_id(),
            fee_structure_id = %request.fee_structure_id,
            dry_run = request.dry_run,
        )
    )]
    pub async fn generate_invoices(
        &self,
        ctx: &TenantContext,
        request: GenerateInvoicesRequest,
    ) -> Result<GenerationReport, BillingError> {
        validate_dates(request.issue_date, request.due_date)?;

        let (structure, assignments) = {
            let mut uow = self.ledger.begin(ctx.school_id).await?;
            let structure = uow
                .fee_structure(request.fee_structure_id)
                .await?
                .ok_or_else(|| BillingError::not_found("FeeStructure", request.fee_structure_id))?;
            let assignments = uow
                .assignments_for_structure(structure.id, request.academic_year_id)
                .await?;
            (structure, assignments)
        };

        let assignments: Vec<StudentFeeAssignment> = match &request.student_ids {
            Some(ids) => assignments.into_iter().filter(|a| ids.contains(&a.student_id)).collect(),
            None => assignments,
        };

        let mut report = GenerationReport {
            created: 0,
            skipped: 0,
            failed: Vec::new(),
            total_amount: Money::zero(structure.currency()),
            dry_run: request.dry_run,
            invoice_ids: Vec::new(),
        };

        // Dry runs share one unit of work that is dropped at the end
        let mut dry_run_uow = if request.dry_run {
            Some(self.ledger.begin(ctx.school_id).await?)
        } else {
            None
        };
        let mut projected: HashMap<InventoryItemId, u32> = HashMap::new();

        for assignment in &assignments {
            if !assignment.is_active && !request.include_inactive_assignments {
                debug!(student_id = %assignment.student_id, "Inactive assignment skipped");
                report.skipped += 1;
                continue;
            }

            let outcome = match dry_run_uow.as_mut() {
                Some(uow) => {
                    self.dry_run_student(uow.as_mut(), &structure, assignment, &request, &mut projected)
                        .await
                }
                None => self.bill_student(ctx, &structure, assignment, &request).await,
            };

            match outcome {
                Ok(StudentOutcome::Skipped) => report.skipped += 1,
                Ok(StudentOutcome::Billed { invoice_id, total }) => {
                    report.created += 1;
                    report.total_amount = report.total_amount.checked_add(&total)?;
                    report.invoice_ids.extend(invoice_id);
                }
                Err(err) => {
                    warn!(student_id = %assignment.student_id, error = %err, "Invoice generation failed for student");
                    report.failed.push(GenerationFailure {
                        student_id: assignment.student_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed.len(),
            total = %report.total_amount,
            "Invoice generation finished"
        );
        Ok(report)
    }

    async fn bill_student(
        &self,
        ctx: &TenantContext,
        structure: &FeeStructure,
        assignment: &StudentFeeAssignment,
        request: &GenerateInvoicesRequest,
    ) -> Result<StudentOutcome, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;

        // Held until commit; a concurrent run for this student waits here
        // and then sees the invoice this run created.
        uow.lock_assignment(assignment.id)
            .await?
            .ok_or_else(|| BillingError::not_found("StudentFeeAssignment", assignment.id))?;

        if !request.overwrite_existing && already_billed(uow.as_mut(), structure, assignment).await? {
            return Ok(StudentOutcome::Skipped);
        }

        let context = uow
            .student_context(assignment.student_id, assignment.academic_year_id)
            .await?;
        let lines = resolve_lines(structure, assignment, context.as_ref())?;
        let items = lines.into_iter().map(NewInvoiceItem::from).collect();

        let detail = build_invoice(
            uow.as_mut(),
            ctx,
            assignment.student_id,
            structure.currency(),
            request.issue_date,
            request.due_date,
            None,
            items,
        )
        .await?;
        uow.commit().await?;

        info!(
            invoice_id = %detail.invoice.id,
            invoice_number = %detail.invoice.invoice_number,
            student_id = %assignment.student_id,
            total = %detail.invoice.total_amount,
            "Invoice generated"
        );
        Ok(StudentOutcome::Billed {
            invoice_id: Some(detail.invoice.id),
            total: detail.invoice.total_amount,
        })
    }

    async fn dry_run_student(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        structure: &FeeStructure,
        assignment: &StudentFeeAssignment,
        request: &GenerateInvoicesRequest,
        projected: &mut HashMap<InventoryItemId, u32>,
    ) -> Result<StudentOutcome, BillingError> {
        if !request.overwrite_existing && already_billed(uow, structure, assignment).await? {
            return Ok(StudentOutcome::Skipped);
        }

        let context = uow
            .student_context(assignment.student_id, assignment.academic_year_id)
            .await?;
        let lines = resolve_lines(structure, assignment, context.as_ref())?;

        let mut needed: HashMap<InventoryItemId, u32> = HashMap::new();
        let mut total = Money::zero(structure.currency());
        for line in &lines {
            total = total.checked_add(&line.total()?)?;
            if let Some(item_id) = line.inventory_item_id {
                *needed.entry(item_id).or_insert(0) += line.quantity;
            }
        }

        // Check every item before committing this student's projection
        for (&item_id, &quantity) in &needed {
            let stock = uow
                .lock_inventory_item(item_id)
                .await?
                .ok_or_else(|| BillingError::not_found("InventoryItem", item_id))?;
            let available = stock
                .quantity_in_stock
                .saturating_sub(projected.get(&item_id).copied().unwrap_or(0));
            if available < quantity {
                return Err(BillingError::InsufficientStock {
                    inventory_item_id: item_id,
                    requested: quantity,
                    available,
                });
            }
        }
        for (item_id, quantity) in needed {
            *projected.entry(item_id).or_insert(0) += quantity;
        }

        Ok(StudentOutcome::Billed { invoice_id: None, total })
    }

    /// Creates a single invoice from arbitrary items
    #[instrument(
        skip(self, ctx, request),
        fields(school_id = %ctx.school_id, correlation_id = ctx.correlation_id(), student_id = %request.student_id)
    )]
    pub async fn create_invoice(
        &self,
        ctx: &TenantContext,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetail, BillingError> {
        validate_dates(request.issue_date, request.due_date)?;
        if request.items.is_empty() {
            return Err(BillingError::validation("An invoice needs at least one item"));
        }
        for item in &request.items {
            item.validate()?;
        }

        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let detail = build_invoice(
            uow.as_mut(),
            ctx,
            request.student_id,
            request.currency,
            request.issue_date,
            request.due_date,
            request.notes,
            request.items,
        )
        .await?;
        uow.commit().await?;

        info!(
            invoice_id = %detail.invoice.id,
            invoice_number = %detail.invoice.invoice_number,
            total = %detail.invoice.total_amount,
            "Invoice created"
        );
        Ok(detail)
    }

    /// Appends an item to an editable invoice
    #[instrument(skip(self, ctx, item), fields(school_id = %ctx.school_id))]
    pub async fn add_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        item: NewInvoiceItem,
        today: NaiveDate,
    ) -> Result<InvoiceDetail, BillingError> {
        item.validate()?;

        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let mut invoice = lock_invoice(uow.as_mut(), invoice_id).await?;
        invoice.ensure_mutable()?;

        let item = InvoiceItem::from_new(invoice.id, invoice.currency, item)?;
        let reservations = reconcile(None, item.stock_hold());
        apply_stock_adjustments(uow.as_mut(), &reservations).await?;

        invoice.apply_item_delta(&item.total_price, today)?;
        uow.insert_item(&item).await?;
        uow.update_invoice(&invoice).await?;

        let detail = load_detail(uow.as_mut(), invoice).await?;
        uow.commit().await?;

        info!(item_id = %item.id, total = %detail.invoice.total_amount, "Invoice item added");
        Ok(detail)
    }

    /// Edits an item, reconciling stock and the invoice total atomically
    #[instrument(skip(self, ctx, patch), fields(school_id = %ctx.school_id))]
    pub async fn update_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        patch: ItemPatch,
        today: NaiveDate,
    ) -> Result<InvoiceDetail, BillingError> {
        if patch.is_empty() {
            return Err(BillingError::validation("Item update has no changes"));
        }

        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let mut invoice = lock_invoice(uow.as_mut(), invoice_id).await?;
        invoice.ensure_mutable()?;

        let current = find_item(uow.as_mut(), invoice_id, item_id).await?;
        let updated = patch.apply_to(&current)?;

        let adjustments = reconcile(current.stock_hold(), updated.stock_hold());
        apply_stock_adjustments(uow.as_mut(), &adjustments).await?;

        let delta = updated.total_price.checked_sub(&current.total_price)?;
        invoice.apply_item_delta(&delta, today)?;
        uow.update_item(&updated).await?;
        uow.update_invoice(&invoice).await?;

        let detail = load_detail(uow.as_mut(), invoice).await?;
        uow.commit().await?;

        info!(delta = %delta, stock_moves = adjustments.len(), "Invoice item updated");
        Ok(detail)
    }

    /// Removes an item, returning any stock it held
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn delete_item(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        today: NaiveDate,
    ) -> Result<InvoiceDetail, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let mut invoice = lock_invoice(uow.as_mut(), invoice_id).await?;
        invoice.ensure_mutable()?;

        let current = find_item(uow.as_mut(), invoice_id, item_id).await?;
        let releases = reconcile(current.stock_hold(), None);
        apply_stock_adjustments(uow.as_mut(), &releases).await?;

        let delta = Money::zero(invoice.currency).checked_sub(&current.total_price)?;
        invoice.apply_item_delta(&delta, today)?;
        uow.delete_item(item_id).await?;
        uow.update_invoice(&invoice).await?;

        let detail = load_detail(uow.as_mut(), invoice).await?;
        uow.commit().await?;

        info!(removed = %current.total_price, "Invoice item deleted");
        Ok(detail)
    }

    /// DRAFT → SENT
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn send(&self, ctx: &TenantContext, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        self.transition(ctx, invoice_id, Invoice::send).await
    }

    /// Any open status → VOID; stock stays with the items
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn void(&self, ctx: &TenantContext, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        self.transition(ctx, invoice_id, Invoice::void).await
    }

    /// Open and unpaid → CANCELLED
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn cancel(&self, ctx: &TenantContext, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        self.transition(ctx, invoice_id, Invoice::cancel).await
    }

    async fn transition(
        &self,
        ctx: &TenantContext,
        invoice_id: InvoiceId,
        action: fn(&mut Invoice) -> Result<(), BillingError>,
    ) -> Result<Invoice, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let mut invoice = lock_invoice(uow.as_mut(), invoice_id).await?;
        let from = invoice.status;

        action(&mut invoice)?;
        uow.update_invoice(&invoice).await?;
        uow.commit().await?;

        info!(%from, to = %invoice.status, "Invoice status changed");
        Ok(invoice)
    }

    pub async fn get_invoice(&self, ctx: &TenantContext, invoice_id: InvoiceId) -> Result<InvoiceDetail, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let invoice = uow
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;
        load_detail(uow.as_mut(), invoice).await
    }

    pub async fn list_student_invoices(
        &self,
        ctx: &TenantContext,
        student_id: StudentId,
    ) -> Result<Vec<Invoice>, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        Ok(uow.list_invoices(&InvoiceQuery::for_student(student_id)).await?)
    }
}

async fn already_billed(
    uow: &mut dyn LedgerUnitOfWork,
    structure: &FeeStructure,
    assignment: &StudentFeeAssignment,
) -> Result<bool, BillingError> {
    let billed = uow
        .has_billed_fee_structure(assignment.student_id, structure.id, &structure.component_ids())
        .await?;
    if billed {
        debug!(student_id = %assignment.student_id, "Student already billed for fee structure");
    }
    Ok(billed)
}

async fn find_item(
    uow: &mut dyn LedgerUnitOfWork,
    invoice_id: InvoiceId,
    item_id: InvoiceItemId,
) -> Result<InvoiceItem, BillingError> {
    uow.invoice_items(invoice_id)
        .await?
        .into_iter()
        .find(|item| item.id == item_id)
        .ok_or_else(|| BillingError::not_found("InvoiceItem", item_id))
}

/// Reserves stock, numbers and writes an invoice with its items
#[allow(clippy::too_many_arguments)]
async fn build_invoice(
    uow: &mut dyn LedgerUnitOfWork,
    ctx: &TenantContext,
    student_id: StudentId,
    currency: Currency,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    notes: Option<String>,
    items: Vec<NewInvoiceItem>,
) -> Result<InvoiceDetail, BillingError> {
    let number = uow.next_invoice_number(issue_date.year()).await?;
    let mut invoice = Invoice::new(
        ctx.school_id,
        number,
        student_id,
        currency,
        issue_date,
        due_date,
        notes,
        ctx.actor_id,
    )?;

    let items = items
        .into_iter()
        .map(|item| InvoiceItem::from_new(invoice.id, currency, item))
        .collect::<Result<Vec<_>, _>>()?;

    let reservations: Vec<StockAdjustment> = items
        .iter()
        .filter_map(InvoiceItem::stock_hold)
        .flat_map(|hold| reconcile(None, Some(hold)))
        .collect();
    apply_stock_adjustments(uow, &reservations).await?;

    invoice.total_amount = Money::sum(currency, items.iter().map(|i| &i.total_price))?;
    uow.insert_invoice(&invoice).await?;
    for item in &items {
        uow.insert_item(item).await?;
    }

    Ok(InvoiceDetail {
        invoice,
        items,
        allocations: Vec::new(),
    })
}
