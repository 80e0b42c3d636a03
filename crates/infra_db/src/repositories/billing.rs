//! Ledger row types
//!
//! Rows are fetched with runtime `query_as` and mapped onto domain types
//! here. Money columns are stored as `NUMERIC` next to a `CHAR(3)` currency
//! code; enum columns hold the domain's string form.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{Currency, Money};
use domain_billing::{
    FeeComponent, FeeFrequency, FeeScope, FeeStructure, InventoryStock, Invoice, InvoiceItem,
    InvoiceStatus, Payment, PaymentAllocation, PaymentMethod, StudentBillingContext,
    StudentFeeAssignment,
};

use crate::error::DatabaseError;

pub(crate) fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    code.trim().parse().map_err(DatabaseError::corrupt)
}

/// Narrows a non-negative count for an `INTEGER` column
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, DatabaseError> {
    i32::try_from(value).map_err(|_| DatabaseError::ConstraintViolation(format!("{} out of range: {}", column, value)))
}

fn to_u32(value: i32, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::corrupt(format!("negative {}: {}", column, value)))
}

#[derive(Debug, Clone, FromRow)]
pub struct FeeStructureRow {
    pub fee_structure_id: Uuid,
    pub school_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub frequency: String,
    pub academic_year_id: Uuid,
    pub class_id: Option<Uuid>,
    pub school_level_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeeComponentRow {
    pub fee_component_id: Uuid,
    pub fee_structure_id: Uuid,
    pub position: i32,
    pub name: String,
    pub amount: Decimal,
    pub inventory_item_id: Option<Uuid>,
}

impl FeeStructureRow {
    /// Components must already be in `position` order
    pub fn into_domain(self, components: Vec<FeeComponentRow>) -> Result<FeeStructure, DatabaseError> {
        let currency = parse_currency(&self.currency)?;
        let scope = FeeScope::from_parts(
            self.academic_year_id.into(),
            self.class_id.map(Into::into),
            self.school_level_id.map(Into::into),
        )
        .map_err(DatabaseError::corrupt)?;

        Ok(FeeStructure {
            id: self.fee_structure_id.into(),
            school_id: self.school_id.into(),
            name: self.name,
            description: self.description,
            amount: Money::new(self.amount, currency),
            components: components
                .into_iter()
                .map(|c| FeeComponent {
                    id: c.fee_component_id.into(),
                    name: c.name,
                    amount: Money::new(c.amount, currency),
                    inventory_item_id: c.inventory_item_id.map(Into::into),
                })
                .collect(),
            frequency: FeeFrequency::parse(&self.frequency).map_err(DatabaseError::corrupt)?,
            scope,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentRow {
    pub assignment_id: Uuid,
    pub school_id: Uuid,
    pub student_id: Uuid,
    pub fee_structure_id: Uuid,
    pub academic_year_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AssignmentRow> for StudentFeeAssignment {
    fn from(row: AssignmentRow) -> Self {
        StudentFeeAssignment {
            id: row.assignment_id.into(),
            school_id: row.school_id.into(),
            student_id: row.student_id.into(),
            fee_structure_id: row.fee_structure_id.into(),
            academic_year_id: row.academic_year_id.into(),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentRow {
    pub school_id: Uuid,
    pub student_id: Uuid,
    pub academic_year_id: Uuid,
    pub class_id: Option<Uuid>,
    pub school_level_id: Option<Uuid>,
}

impl From<EnrollmentRow> for StudentBillingContext {
    fn from(row: EnrollmentRow) -> Self {
        StudentBillingContext {
            school_id: row.school_id.into(),
            student_id: row.student_id.into(),
            academic_year_id: row.academic_year_id.into(),
            class_id: row.class_id.map(Into::into),
            school_level_id: row.school_level_id.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InventoryItemRow {
    pub inventory_item_id: Uuid,
    pub school_id: Uuid,
    pub name: String,
    pub quantity_in_stock: i32,
}

impl TryFrom<InventoryItemRow> for InventoryStock {
    type Error = DatabaseError;

    fn try_from(row: InventoryItemRow) -> Result<Self, Self::Error> {
        Ok(InventoryStock {
            id: row.inventory_item_id.into(),
            school_id: row.school_id.into(),
            name: row.name,
            quantity_in_stock: to_u32(row.quantity_in_stock, "quantity_in_stock")?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub school_id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DatabaseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        let status: InvoiceStatus = row.status.parse().map_err(DatabaseError::corrupt)?;
        Ok(Invoice {
            id: row.invoice_id.into(),
            school_id: row.school_id.into(),
            invoice_number: row.invoice_number,
            student_id: row.student_id.into(),
            currency,
            issue_date: row.issue_date,
            due_date: row.due_date,
            total_amount: Money::new(row.total_amount, currency),
            paid_amount: Money::new(row.paid_amount, currency),
            status,
            sent_at: row.sent_at,
            notes: row.notes,
            created_by: row.created_by.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Item row joined with its invoice's currency
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceItemRow {
    pub invoice_item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub fee_structure_id: Option<Uuid>,
    pub fee_component_id: Option<Uuid>,
    pub inventory_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub currency: String,
}

impl TryFrom<InvoiceItemRow> for InvoiceItem {
    type Error = DatabaseError;

    fn try_from(row: InvoiceItemRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(InvoiceItem {
            id: row.invoice_item_id.into(),
            invoice_id: row.invoice_id.into(),
            description: row.description,
            quantity: to_u32(row.quantity, "quantity")?,
            unit_price: Money::new(row.unit_price, currency),
            total_price: Money::new(row.total_price, currency),
            fee_structure_id: row.fee_structure_id.map(Into::into),
            fee_component_id: row.fee_component_id.map(Into::into),
            inventory_item_id: row.inventory_item_id.map(Into::into),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub school_id: Uuid,
    pub student_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.payment_id.into(),
            school_id: row.school_id.into(),
            student_id: row.student_id.into(),
            amount: Money::new(row.amount, parse_currency(&row.currency)?),
            payment_date: row.payment_date,
            method: PaymentMethod::parse(&row.method).map_err(DatabaseError::corrupt)?,
            reference: row.reference,
            notes: row.notes,
            processed_by: row.processed_by.into(),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AllocationRow {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AllocationRow> for PaymentAllocation {
    type Error = DatabaseError;

    fn try_from(row: AllocationRow) -> Result<Self, Self::Error> {
        Ok(PaymentAllocation {
            id: row.allocation_id.into(),
            payment_id: row.payment_id.into(),
            invoice_id: row.invoice_id.into(),
            amount: Money::new(row.amount, parse_currency(&row.currency)?),
            created_at: row.created_at,
        })
    }
}

/// Maps a batch of rows, failing on the first corrupt one
pub(crate) fn map_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice_row(status: &str, currency: &str) -> InvoiceRow {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        InvoiceRow {
            invoice_id: Uuid::new_v4(),
            school_id: Uuid::new_v4(),
            invoice_number: "INV-2026-000001".to_string(),
            student_id: Uuid::new_v4(),
            currency: currency.to_string(),
            issue_date: date,
            due_date: date,
            total_amount: dec!(1500),
            paid_amount: dec!(1000),
            status: status.to_string(),
            sent_at: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_invoice_row_maps_money_and_status() {
        let invoice = Invoice::try_from(invoice_row("PARTIALLY_PAID", "KES")).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.total_amount, Money::new(dec!(1500), Currency::KES));
        assert_eq!(invoice.paid_amount.currency(), Currency::KES);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let result = Invoice::try_from(invoice_row("ARCHIVED", "KES"));
        assert!(matches!(result, Err(DatabaseError::CorruptRow(_))));
    }

    #[test]
    fn test_unknown_currency_is_corrupt() {
        let result = Invoice::try_from(invoice_row("DRAFT", "XXX"));
        assert!(matches!(result, Err(DatabaseError::CorruptRow(_))));
    }

    #[test]
    fn test_structure_with_both_scopes_is_corrupt() {
        let row = FeeStructureRow {
            fee_structure_id: Uuid::new_v4(),
            school_id: Uuid::new_v4(),
            name: "Term 1".to_string(),
            description: None,
            amount: dec!(100),
            currency: "KES".to_string(),
            frequency: "termly".to_string(),
            academic_year_id: Uuid::new_v4(),
            class_id: Some(Uuid::new_v4()),
            school_level_id: Some(Uuid::new_v4()),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(row.into_domain(Vec::new()).is_err());
    }

    #[test]
    fn test_negative_stock_is_corrupt() {
        let row = InventoryItemRow {
            inventory_item_id: Uuid::new_v4(),
            school_id: Uuid::new_v4(),
            name: "Tie".to_string(),
            quantity_in_stock: -1,
        };
        assert!(InventoryStock::try_from(row).is_err());
    }

    #[test]
    fn test_quantity_narrowing() {
        assert_eq!(to_i32(5, "quantity").unwrap(), 5);
        assert!(to_i32(u32::MAX, "quantity").is_err());
    }
}
