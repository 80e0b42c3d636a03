//! Billing application services
//!
//! Each public operation validates its input, opens one unit of work on the
//! [`LedgerPort`], and commits only when every step succeeded. Batch
//! invoice generation is the exception: it commits per student.

pub mod fee_setup;
pub mod invoicing;
pub mod payments;
pub mod reporting;

use std::sync::Arc;
use tracing::debug;

use core_kernel::InventoryItemId;

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceDetail};
use crate::ports::{LedgerPort, LedgerUnitOfWork};
use crate::stock::{StockAdjustment, StockChange};

pub use fee_setup::{AssignFeeRequest, CreateFeeStructureRequest, FeeSetupService, NewFeeComponent};
pub use invoicing::{
    CreateInvoiceRequest, GenerateInvoicesRequest, GenerationFailure, GenerationReport, InvoiceService,
};
pub use payments::PaymentService;
pub use reporting::ReportingService;

/// All ledger services sharing one port
#[derive(Clone)]
pub struct LedgerServices {
    pub fee_setup: FeeSetupService,
    pub invoices: InvoiceService,
    pub payments: PaymentService,
    pub reporting: ReportingService,
}

impl LedgerServices {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self {
            fee_setup: FeeSetupService::new(ledger.clone()),
            invoices: InvoiceService::new(ledger.clone()),
            payments: PaymentService::new(ledger.clone()),
            reporting: ReportingService::new(ledger),
        }
    }
}

/// Applies stock movements in order inside the caller's unit of work
pub(crate) async fn apply_stock_adjustments(
    uow: &mut dyn LedgerUnitOfWork,
    adjustments: &[StockAdjustment],
) -> Result<(), BillingError> {
    for adjustment in adjustments {
        match adjustment.change {
            StockChange::Reserve(quantity) => {
                reserve_stock(uow, adjustment.inventory_item_id, quantity).await?;
            }
            StockChange::Release(quantity) => {
                uow.increment_stock(adjustment.inventory_item_id, quantity).await?;
                debug!(inventory_item_id = %adjustment.inventory_item_id, quantity, "Stock released");
            }
        }
    }
    Ok(())
}

async fn reserve_stock(
    uow: &mut dyn LedgerUnitOfWork,
    inventory_item_id: InventoryItemId,
    quantity: u32,
) -> Result<(), BillingError> {
    let stock = uow
        .lock_inventory_item(inventory_item_id)
        .await?
        .ok_or_else(|| BillingError::not_found("InventoryItem", inventory_item_id))?;

    if !uow.try_decrement_stock(inventory_item_id, quantity).await? {
        return Err(BillingError::InsufficientStock {
            inventory_item_id,
            requested: quantity,
            available: stock.quantity_in_stock,
        });
    }

    debug!(
        %inventory_item_id,
        quantity,
        remaining = stock.quantity_in_stock.saturating_sub(quantity),
        "Stock reserved"
    );
    Ok(())
}

pub(crate) async fn lock_invoice(
    uow: &mut dyn LedgerUnitOfWork,
    invoice_id: core_kernel::InvoiceId,
) -> Result<Invoice, BillingError> {
    uow.lock_invoice(invoice_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))
}

pub(crate) async fn load_detail(
    uow: &mut dyn LedgerUnitOfWork,
    invoice: Invoice,
) -> Result<InvoiceDetail, BillingError> {
    let items = uow.invoice_items(invoice.id).await?;
    let allocations = uow.allocations_for_invoice(invoice.id).await?;
    Ok(InvoiceDetail {
        invoice,
        items,
        allocations,
    })
}
