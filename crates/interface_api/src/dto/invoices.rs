//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{InventoryItemId, StudentId};
use domain_billing as billing;
use domain_billing::{Invoice, InvoiceDetail, InvoiceItem, ItemPatch, NewInvoiceItem, PaymentAllocation};

use super::parse_currency;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct InvoiceItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub unit_price: Decimal,
    pub inventory_item_id: Option<Uuid>,
}

impl From<InvoiceItemRequest> for NewInvoiceItem {
    fn from(item: InvoiceItemRequest) -> Self {
        let new = NewInvoiceItem::new(item.description, item.quantity, item.unit_price);
        match item.inventory_item_id {
            Some(id) => new.with_inventory_item(InventoryItemId::from_uuid(id)),
            None => new,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub student_id: Uuid,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<InvoiceItemRequest>,
}

impl CreateInvoiceRequest {
    pub fn into_domain(self) -> Result<billing::CreateInvoiceRequest, ApiError> {
        Ok(billing::CreateInvoiceRequest {
            student_id: StudentId::from_uuid(self.student_id),
            currency: parse_currency(&self.currency)?,
            issue_date: self.issue_date,
            due_date: self.due_date,
            notes: self.notes,
            items: self.items.into_iter().map(NewInvoiceItem::from).collect(),
        })
    }
}

/// Partial item edit
///
/// `inventory_item_id` relinks the item; `unlink_inventory` removes the link.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<u32>,
    pub unit_price: Option<Decimal>,
    pub inventory_item_id: Option<Uuid>,
    #[serde(default)]
    pub unlink_inventory: bool,
}

impl UpdateItemRequest {
    pub fn into_patch(self) -> Result<ItemPatch, ApiError> {
        let inventory_item_id = match (self.inventory_item_id, self.unlink_inventory) {
            (Some(_), true) => {
                return Err(ApiError::validation(
                    "inventory_item_id and unlink_inventory are mutually exclusive",
                ))
            }
            (Some(id), false) => Some(Some(InventoryItemId::from_uuid(id))),
            (None, true) => Some(None),
            (None, false) => None,
        };
        Ok(ItemPatch {
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            inventory_item_id,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub fee_structure_id: Option<Uuid>,
    pub fee_component_id: Option<Uuid>,
    pub inventory_item_id: Option<Uuid>,
}

impl From<InvoiceItem> for InvoiceItemResponse {
    fn from(item: InvoiceItem) -> Self {
        Self {
            id: item.id.into(),
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price.amount(),
            total_price: item.total_price.amount(),
            fee_structure_id: item.fee_structure_id.map(Uuid::from),
            fee_component_id: item.fee_component_id.map(Uuid::from),
            inventory_item_id: item.inventory_item_id.map(Uuid::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentAllocation> for AllocationResponse {
    fn from(allocation: PaymentAllocation) -> Self {
        Self {
            id: allocation.id.into(),
            payment_id: allocation.payment_id.into(),
            invoice_id: allocation.invoice_id.into(),
            amount: allocation.amount.amount(),
            created_at: allocation.created_at,
        }
    }
}

/// Invoice header without items
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding: Decimal,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.into(),
            student_id: invoice.student_id.into(),
            currency: invoice.currency.code().to_string(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            total_amount: invoice.total_amount.amount(),
            paid_amount: invoice.paid_amount.amount(),
            outstanding: invoice.total_amount.amount() - invoice.paid_amount.amount(),
            status: invoice.status.as_str().to_string(),
            sent_at: invoice.sent_at,
            invoice_number: invoice.invoice_number,
            notes: invoice.notes,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetailResponse {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub items: Vec<InvoiceItemResponse>,
    pub allocations: Vec<AllocationResponse>,
}

impl From<InvoiceDetail> for InvoiceDetailResponse {
    fn from(detail: InvoiceDetail) -> Self {
        Self {
            invoice: detail.invoice.into(),
            items: detail.items.into_iter().map(Into::into).collect(),
            allocations: detail.allocations.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unlink_and_relink_are_exclusive() {
        let body = UpdateItemRequest {
            inventory_item_id: Some(Uuid::new_v4()),
            unlink_inventory: true,
            ..Default::default()
        };
        assert!(body.into_patch().is_err());
    }

    #[test]
    fn test_unlink_clears_link() {
        let body = UpdateItemRequest {
            unlink_inventory: true,
            ..Default::default()
        };
        assert_eq!(body.into_patch().unwrap().inventory_item_id, Some(None));
    }

    #[test]
    fn test_invoice_without_items_fails_validation() {
        let body = CreateInvoiceRequest {
            student_id: Uuid::new_v4(),
            currency: "KES".into(),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            notes: None,
            items: vec![],
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_item_request_keeps_stock_link() {
        let stock = Uuid::new_v4();
        let item = NewInvoiceItem::from(InvoiceItemRequest {
            description: "Uniform".into(),
            quantity: 2,
            unit_price: dec!(800),
            inventory_item_id: Some(stock),
        });
        assert_eq!(item.inventory_item_id, Some(InventoryItemId::from_uuid(stock)));
    }
}
