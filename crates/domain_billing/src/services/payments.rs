//! Payment recording and allocation

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{Money, PaymentId, TenantContext};

use crate::allocation::{waterfall, OpenBalance};
use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::payment::{
    Payment, PaymentAllocation, PaymentDetail, PaymentReceipt, PaymentTarget, RecordPaymentRequest,
};
use crate::ports::LedgerPort;

use super::lock_invoice;

/// Records payments and spreads them over invoices
#[derive(Clone)]
pub struct PaymentService {
    ledger: Arc<dyn LedgerPort>,
}

impl PaymentService {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    /// Records a payment and allocates it in one unit of work
    ///
    /// Direct mode caps the allocation at the invoice's balance. Student-wide
    /// mode runs the waterfall over the student's open invoices in the
    /// payment currency. In both modes any remainder is reported as
    /// `unapplied` and not kept.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount, a currency mismatch, or a
    ///   student with nothing outstanding
    /// - `InvoiceLocked` when a direct payment targets a PAID, VOID or
    ///   CANCELLED invoice
    /// - `NotFound` for an unknown invoice
    #[instrument(
        skip(self, ctx, request),
        fields(school_id = %ctx.school_id, correlation_id = ctx.correlation_id(), amount = %request.amount)
    )]
    pub async fn record_payment(
        &self,
        ctx: &TenantContext,
        request: RecordPaymentRequest,
        today: NaiveDate,
    ) -> Result<PaymentReceipt, BillingError> {
        request.validate()?;
        let currency = request.currency;
        let amount = Money::new(request.amount, currency);

        let mut uow = self.ledger.begin(ctx.school_id).await?;

        let (student_id, mut invoices) = match request.target {
            PaymentTarget::Invoice(invoice_id) => {
                let invoice = lock_invoice(uow.as_mut(), invoice_id).await?;
                invoice.ensure_mutable()?;
                if invoice.currency != currency {
                    return Err(BillingError::validation(format!(
                        "Payment currency {} does not match invoice currency {}",
                        currency, invoice.currency
                    )));
                }
                (invoice.student_id, vec![invoice])
            }
            PaymentTarget::Student(student_id) => {
                let invoices: Vec<Invoice> = uow
                    .lock_open_invoices_for_student(student_id)
                    .await?
                    .into_iter()
                    .filter(|i| i.currency == currency)
                    .collect();
                (student_id, invoices)
            }
        };

        let balances = invoices
            .iter()
            .map(|invoice| {
                Ok(OpenBalance {
                    invoice_id: invoice.id,
                    due_date: invoice.due_date,
                    issue_date: invoice.issue_date,
                    outstanding: invoice.outstanding()?,
                })
            })
            .collect::<Result<Vec<_>, BillingError>>()?;

        if matches!(request.target, PaymentTarget::Student(_)) && balances.iter().all(|b| b.outstanding.is_zero()) {
            return Err(BillingError::validation(format!(
                "Student {} has no outstanding {} invoices",
                student_id, currency
            )));
        }

        let plan = waterfall(&amount, &balances)?;

        let payment = Payment {
            id: PaymentId::new_v7(),
            school_id: ctx.school_id,
            student_id,
            amount,
            payment_date: request.payment_date,
            method: request.method,
            reference: request.reference,
            notes: request.notes,
            processed_by: ctx.actor_id,
            created_at: Utc::now(),
        };
        uow.insert_payment(&payment).await?;

        for line in &plan.lines {
            let invoice = invoices
                .iter_mut()
                .find(|i| i.id == line.invoice_id)
                .ok_or_else(|| BillingError::not_found("Invoice", line.invoice_id))?;
            invoice.apply_allocation(&line.amount, today)?;

            uow.insert_allocation(&PaymentAllocation::new(payment.id, invoice.id, line.amount))
                .await?;
            uow.update_invoice(invoice).await?;
        }

        uow.commit().await?;

        info!(
            payment_id = %payment.id,
            %student_id,
            allocations = plan.lines.len(),
            allocated = %plan.allocated,
            "Payment recorded"
        );
        if plan.unapplied.is_positive() {
            warn!(
                payment_id = %payment.id,
                unapplied = %plan.unapplied,
                "Payment exceeds outstanding balance; remainder not applied"
            );
        }

        Ok(PaymentReceipt {
            payment_id: payment.id,
            allocations: plan.lines.len(),
            allocated: plan.allocated,
            unapplied: plan.unapplied,
        })
    }

    pub async fn get_payment(&self, ctx: &TenantContext, payment_id: PaymentId) -> Result<PaymentDetail, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let payment = uow
            .payment(payment_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;
        let allocations = uow.allocations_for_payment(payment_id).await?;
        Ok(PaymentDetail { payment, allocations })
    }
}
