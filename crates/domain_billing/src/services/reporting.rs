//! Aging, dashboard and overdue refresh

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::{Currency, TenantContext};

use crate::aging::{AgingReport, DashboardStats};
use crate::error::BillingError;
use crate::ports::{InvoiceQuery, LedgerPort};

#[derive(Clone)]
pub struct ReportingService {
    ledger: Arc<dyn LedgerPort>,
}

impl ReportingService {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    pub async fn aging_report(
        &self,
        ctx: &TenantContext,
        currency: Currency,
        today: NaiveDate,
    ) -> Result<AgingReport, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let open = uow.list_invoices(&InvoiceQuery::open()).await?;
        AgingReport::build(currency, open.iter(), today)
    }

    pub async fn dashboard(
        &self,
        ctx: &TenantContext,
        currency: Currency,
        today: NaiveDate,
    ) -> Result<DashboardStats, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let invoices = uow.list_invoices(&InvoiceQuery::default()).await?;
        let collected = uow.sum_payments(currency).await?;
        let allocated = uow.sum_allocations(currency).await?;
        DashboardStats::build(currency, &invoices, collected, allocated, today)
    }

    /// Re-derives the status of every open invoice; returns how many changed
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn refresh_statuses(&self, ctx: &TenantContext, today: NaiveDate) -> Result<usize, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let open = uow.list_invoices(&InvoiceQuery::open()).await?;

        let mut changed = 0;
        for listed in open {
            let Some(mut invoice) = uow.lock_invoice(listed.id).await? else {
                continue;
            };
            if invoice.refresh_status(today) {
                uow.update_invoice(&invoice).await?;
                changed += 1;
            }
        }
        uow.commit().await?;

        info!(changed, "Invoice statuses refreshed");
        Ok(changed)
    }
}
