//! Invoices, invoice items and the status state machine
//!
//! An invoice's `total_amount` is always the live sum of its items and its
//! `paid_amount` the live sum of allocations against it. Status is derived
//! from those two figures, the due date and an explicit `today`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    Currency, FeeComponentId, FeeStructureId, InventoryItemId, InvoiceId, InvoiceItemId, Money,
    SchoolId, StudentId, UserId,
};

use crate::error::BillingError;
use crate::fee_structure::BillableLine;
use crate::payment::PaymentAllocation;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Created, not yet sent to the guardian
    Draft,
    /// Issued and awaiting payment
    Sent,
    /// Some payment received, not past due
    PartiallyPaid,
    /// Past due with a balance remaining
    Overdue,
    /// Fully settled
    Paid,
    /// Withdrawn by an administrator
    Void,
    /// Cancelled before any payment
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Paid,
        InvoiceStatus::Void,
        InvoiceStatus::Cancelled,
    ];

    /// Statuses that still accept payments and item edits
    pub const OPEN: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    /// PAID, VOID and CANCELLED freeze the invoice
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Void | InvoiceStatus::Cancelled
        )
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the invoice still counts towards billed totals
    pub fn is_billable(&self) -> bool {
        !matches!(self, InvoiceStatus::Void | InvoiceStatus::Cancelled)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BillingError::validation(format!("Unknown invoice status: {}", s)))
    }
}

/// Derives an invoice status from its figures
///
/// Pure and idempotent. Terminal statuses are returned unchanged; VOID and
/// CANCELLED are only reachable through explicit actions. `sent` records
/// whether the invoice was ever issued: an unpaid invoice that is no longer
/// past due returns to SENT if so and to DRAFT otherwise.
pub fn recompute_status(
    current: InvoiceStatus,
    sent: bool,
    total: &Money,
    paid: &Money,
    due_date: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    if current.is_terminal() {
        return current;
    }

    let past_due = due_date < today;

    if paid.is_zero() {
        return if past_due {
            InvoiceStatus::Overdue
        } else if sent || current == InvoiceStatus::Sent {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::Draft
        };
    }

    // Settled within one minor unit of the currency
    let epsilon = Money::minor_unit(total.currency()).amount();
    if paid.amount() >= total.amount() - epsilon {
        return InvoiceStatus::Paid;
    }

    if past_due {
        InvoiceStatus::Overdue
    } else {
        InvoiceStatus::PartiallyPaid
    }
}

/// An invoice header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub school_id: SchoolId,
    /// Human-readable number, `INV-{year}-{sequence}`
    pub invoice_number: String,
    pub student_id: StudentId,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub status: InvoiceStatus,
    /// Set once by the send action
    pub sent_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates an empty DRAFT invoice
    ///
    /// # Errors
    ///
    /// Returns a validation error when the due date precedes the issue date.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        school_id: SchoolId,
        invoice_number: String,
        student_id: StudentId,
        currency: Currency,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        notes: Option<String>,
        created_by: UserId,
    ) -> Result<Self, BillingError> {
        validate_dates(issue_date, due_date)?;
        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new_v7(),
            school_id,
            invoice_number,
            student_id,
            currency,
            issue_date,
            due_date,
            total_amount: Money::zero(currency),
            paid_amount: Money::zero(currency),
            status: InvoiceStatus::Draft,
            sent_at: None,
            notes,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// Remaining balance, never negative
    pub fn outstanding(&self) -> Result<Money, BillingError> {
        let balance = self.total_amount.checked_sub(&self.paid_amount)?;
        if balance.is_negative() {
            Ok(Money::zero(self.currency))
        } else {
            Ok(balance)
        }
    }

    /// Rejects any mutation of a PAID, VOID or CANCELLED invoice
    pub fn ensure_mutable(&self) -> Result<(), BillingError> {
        if self.status.is_terminal() {
            return Err(BillingError::InvoiceLocked {
                invoice_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn days_past_due(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days().max(0)
    }

    /// Adjusts the total by an item delta and re-derives status
    ///
    /// The total may not drop below what has already been paid.
    pub fn apply_item_delta(&mut self, delta: &Money, today: NaiveDate) -> Result<(), BillingError> {
        self.ensure_mutable()?;
        let total = self.total_amount.checked_add(delta)?;
        if total.is_negative() {
            return Err(BillingError::validation(format!(
                "Invoice {} total cannot become negative",
                self.invoice_number
            )));
        }
        if total.amount() < self.paid_amount.amount() {
            return Err(BillingError::validation(format!(
                "Invoice {} total {} would fall below the amount already paid {}",
                self.invoice_number, total, self.paid_amount
            )));
        }
        self.total_amount = total;
        self.refresh_status(today);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records an allocated amount against the invoice
    pub fn apply_allocation(&mut self, amount: &Money, today: NaiveDate) -> Result<(), BillingError> {
        self.ensure_mutable()?;
        let paid = self.paid_amount.checked_add(amount)?;
        if paid.amount() > self.total_amount.amount() {
            return Err(BillingError::validation(format!(
                "Allocation of {} exceeds the outstanding balance of invoice {}",
                amount, self.invoice_number
            )));
        }
        self.paid_amount = paid;
        self.refresh_status(today);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-derives status; returns whether it changed
    pub fn refresh_status(&mut self, today: NaiveDate) -> bool {
        let next = recompute_status(
            self.status,
            self.sent_at.is_some(),
            &self.total_amount,
            &self.paid_amount,
            self.due_date,
            today,
        );
        let changed = next != self.status;
        self.status = next;
        changed
    }

    /// DRAFT → SENT
    pub fn send(&mut self) -> Result<(), BillingError> {
        self.ensure_mutable()?;
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::validation(format!(
                "Only draft invoices can be sent; {} is {}",
                self.invoice_number, self.status
            )));
        }
        self.transition(InvoiceStatus::Sent);
        self.sent_at = Some(self.updated_at);
        Ok(())
    }

    /// Any open status → VOID
    pub fn void(&mut self) -> Result<(), BillingError> {
        self.ensure_mutable()?;
        self.transition(InvoiceStatus::Void);
        Ok(())
    }

    /// Open and unpaid → CANCELLED
    pub fn cancel(&mut self) -> Result<(), BillingError> {
        self.ensure_mutable()?;
        if !self.paid_amount.is_zero() {
            return Err(BillingError::validation(format!(
                "Invoice {} has payments allocated and cannot be cancelled; void it instead",
                self.invoice_number
            )));
        }
        self.transition(InvoiceStatus::Cancelled);
        Ok(())
    }

    fn transition(&mut self, status: InvoiceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

pub(crate) fn validate_dates(issue_date: NaiveDate, due_date: NaiveDate) -> Result<(), BillingError> {
    if due_date < issue_date {
        return Err(BillingError::validation(format!(
            "Due date {} is before issue date {}",
            due_date, issue_date
        )));
    }
    Ok(())
}

/// A line on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Always `quantity × unit_price`
    pub total_price: Money,
    pub fee_structure_id: Option<FeeStructureId>,
    pub fee_component_id: Option<FeeComponentId>,
    pub inventory_item_id: Option<InventoryItemId>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceItem {
    pub fn from_new(invoice_id: InvoiceId, currency: Currency, new: NewInvoiceItem) -> Result<Self, BillingError> {
        new.validate()?;
        let unit_price = Money::new(new.unit_price, currency);
        let total_price = unit_price.times(new.quantity)?;
        Ok(Self {
            id: InvoiceItemId::new_v7(),
            invoice_id,
            description: new.description.trim().to_string(),
            quantity: new.quantity,
            unit_price,
            total_price,
            fee_structure_id: new.fee_structure_id,
            fee_component_id: new.fee_component_id,
            inventory_item_id: new.inventory_item_id,
            created_at: Utc::now(),
        })
    }

    /// Stock held by this item, if linked
    pub fn stock_hold(&self) -> Option<(InventoryItemId, u32)> {
        self.inventory_item_id.map(|id| (id, self.quantity))
    }
}

/// Input for a new invoice line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub fee_structure_id: Option<FeeStructureId>,
    #[serde(default)]
    pub fee_component_id: Option<FeeComponentId>,
    #[serde(default)]
    pub inventory_item_id: Option<InventoryItemId>,
}

impl NewInvoiceItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            fee_structure_id: None,
            fee_component_id: None,
            inventory_item_id: None,
        }
    }

    pub fn with_inventory_item(mut self, inventory_item_id: InventoryItemId) -> Self {
        self.inventory_item_id = Some(inventory_item_id);
        self
    }

    pub fn validate(&self) -> Result<(), BillingError> {
        validate_line(&self.description, self.quantity, self.unit_price)
    }
}

impl From<BillableLine> for NewInvoiceItem {
    fn from(line: BillableLine) -> Self {
        Self {
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price.amount(),
            fee_structure_id: Some(line.fee_structure_id),
            fee_component_id: line.fee_component_id,
            inventory_item_id: line.inventory_item_id,
        }
    }
}

fn validate_line(description: &str, quantity: u32, unit_price: Decimal) -> Result<(), BillingError> {
    if description.trim().is_empty() {
        return Err(BillingError::validation("Item description is required"));
    }
    if quantity < 1 {
        return Err(BillingError::validation("Item quantity must be at least 1"));
    }
    if unit_price < Decimal::ZERO {
        return Err(BillingError::validation("Item unit price cannot be negative"));
    }
    Ok(())
}

/// Partial update of an invoice item
///
/// `inventory_item_id`: `None` leaves the link unchanged, `Some(None)`
/// unlinks, `Some(Some(id))` re-links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub unit_price: Option<Decimal>,
    pub inventory_item_id: Option<Option<InventoryItemId>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.quantity.is_none()
            && self.unit_price.is_none()
            && self.inventory_item_id.is_none()
    }

    /// Returns the item as it would look after the patch
    pub fn apply_to(&self, item: &InvoiceItem) -> Result<InvoiceItem, BillingError> {
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or(&item.description)
            .to_string();
        let quantity = self.quantity.unwrap_or(item.quantity);
        let unit_price = self.unit_price.unwrap_or_else(|| item.unit_price.amount());
        validate_line(&description, quantity, unit_price)?;

        let unit_price = Money::new(unit_price, item.unit_price.currency());
        let mut updated = item.clone();
        updated.description = description;
        updated.quantity = quantity;
        updated.unit_price = unit_price;
        updated.total_price = unit_price.times(quantity)?;
        if let Some(link) = self.inventory_item_id {
            updated.inventory_item_id = link;
        }
        Ok(updated)
    }
}

/// Invoice header with its items and the allocations paid against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub allocations: Vec<PaymentAllocation>,
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = InvoiceStatus> {
        prop::sample::select(InvoiceStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn recompute_is_idempotent(
            status in arb_status(),
            sent in any::<bool>(),
            total_minor in 0i64..10_000_000,
            paid_pct in 0u32..=100,
            due_offset in -120i64..120,
        ) {
            let total = Money::from_minor(total_minor, Currency::USD);
            let paid = Money::from_minor(total_minor * paid_pct as i64 / 100, Currency::USD);
            let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
            let due = today + chrono::Duration::days(due_offset);

            let once = recompute_status(status, sent, &total, &paid, due, today);
            let twice = recompute_status(once, sent, &total, &paid, due, today);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn paid_invoice_never_reported_open(
            total_minor in 1i64..10_000_000,
            due_offset in -120i64..120,
        ) {
            let total = Money::from_minor(total_minor, Currency::USD);
            let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
            let due = today + chrono::Duration::days(due_offset);

            let status = recompute_status(InvoiceStatus::Sent, true, &total, &total, due, today);
            prop_assert_eq!(status, InvoiceStatus::Paid);
        }
    }
}
