//! Test Data Builders
//!
//! Builders with sensible defaults so tests only spell out the fields they
//! care about.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{
    AcademicYearId, ClassId, Currency, InventoryItemId, InvoiceId, Money, SchoolId, SchoolLevelId,
    StudentId, UserId,
};
use domain_billing::{
    CreateFeeStructureRequest, CreateInvoiceRequest, FeeFrequency, Invoice, InvoiceStatus,
    NewFeeComponent, NewInvoiceItem, PaymentMethod, PaymentTarget, RecordPaymentRequest,
};

use crate::fixtures::{DateFixtures, SchoolFixture};

/// Builder for fee structure creation requests
///
/// Defaults to the standard itemized term fee: Tuition 1200 + Activity 300
/// in KES, termly, scoped to the fixture's class.
pub struct FeeStructureRequestBuilder {
    name: String,
    currency: Currency,
    amount: Option<Decimal>,
    components: Vec<NewFeeComponent>,
    frequency: FeeFrequency,
    academic_year_id: AcademicYearId,
    class_id: Option<ClassId>,
    school_level_id: Option<SchoolLevelId>,
}

impl FeeStructureRequestBuilder {
    pub fn new(school: &SchoolFixture) -> Self {
        Self {
            name: "Term 1 Fees".to_string(),
            currency: Currency::KES,
            amount: None,
            components: vec![
                component("Tuition", dec!(1200)),
                component("Activity", dec!(300)),
            ],
            frequency: FeeFrequency::Termly,
            academic_year_id: school.academic_year_id,
            class_id: Some(school.class_id),
            school_level_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the components with a single flat amount
    pub fn flat(mut self, amount: Decimal) -> Self {
        self.components.clear();
        self.amount = Some(amount);
        self
    }

    pub fn with_components(mut self, components: Vec<NewFeeComponent>) -> Self {
        self.components = components;
        self
    }

    /// Appends a component that reserves one unit of stock per student
    pub fn with_stock_component(mut self, name: &str, amount: Decimal, item: InventoryItemId) -> Self {
        self.components.push(NewFeeComponent {
            name: name.to_string(),
            amount,
            inventory_item_id: Some(item),
        });
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_frequency(mut self, frequency: FeeFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Scopes the structure to a school level instead of a class
    pub fn for_level(mut self, school_level_id: SchoolLevelId) -> Self {
        self.class_id = None;
        self.school_level_id = Some(school_level_id);
        self
    }

    pub fn build(self) -> CreateFeeStructureRequest {
        CreateFeeStructureRequest {
            name: self.name,
            description: None,
            currency: self.currency,
            amount: self.amount,
            components: self.components,
            frequency: self.frequency,
            academic_year_id: self.academic_year_id,
            class_id: self.class_id,
            school_level_id: self.school_level_id,
        }
    }
}

/// A component without stock linkage
pub fn component(name: &str, amount: Decimal) -> NewFeeComponent {
    NewFeeComponent {
        name: name.to_string(),
        amount,
        inventory_item_id: None,
    }
}

/// Builder for ad-hoc invoice requests
pub struct InvoiceRequestBuilder {
    student_id: StudentId,
    currency: Currency,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    notes: Option<String>,
    items: Vec<NewInvoiceItem>,
}

impl InvoiceRequestBuilder {
    pub fn new(student_id: StudentId) -> Self {
        Self {
            student_id,
            currency: Currency::KES,
            issue_date: DateFixtures::issue_date(),
            due_date: DateFixtures::due_date(),
            notes: None,
            items: Vec::new(),
        }
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn issued(mut self, issue_date: NaiveDate) -> Self {
        self.issue_date = issue_date;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn item(mut self, description: &str, quantity: u32, unit_price: Decimal) -> Self {
        self.items.push(NewInvoiceItem::new(description, quantity, unit_price));
        self
    }

    pub fn stock_item(mut self, description: &str, quantity: u32, unit_price: Decimal, item: InventoryItemId) -> Self {
        self.items
            .push(NewInvoiceItem::new(description, quantity, unit_price).with_inventory_item(item));
        self
    }

    pub fn build(self) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            student_id: self.student_id,
            currency: self.currency,
            issue_date: self.issue_date,
            due_date: self.due_date,
            notes: self.notes,
            items: self.items,
        }
    }
}

/// Builder for invoice values used by pure status and aging tests
pub struct TestInvoiceBuilder {
    school_id: SchoolId,
    student_id: StudentId,
    number: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    total: Decimal,
    paid: Decimal,
    status: InvoiceStatus,
}

impl Default for TestInvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestInvoiceBuilder {
    pub fn new() -> Self {
        Self {
            school_id: SchoolId::new(),
            student_id: StudentId::new(),
            number: "INV-2026-000001".to_string(),
            issue_date: DateFixtures::issue_date(),
            due_date: DateFixtures::due_date(),
            total: dec!(1500),
            paid: Decimal::ZERO,
            status: InvoiceStatus::Draft,
        }
    }

    pub fn for_student(mut self, school_id: SchoolId, student_id: StudentId) -> Self {
        self.school_id = school_id;
        self.student_id = student_id;
        self
    }

    pub fn numbered(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        if self.issue_date > due_date {
            self.issue_date = due_date;
        }
        self
    }

    pub fn total(mut self, total: Decimal) -> Self {
        self.total = total;
        self
    }

    pub fn paid(mut self, paid: Decimal) -> Self {
        self.paid = paid;
        self
    }

    pub fn status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    /// # Panics
    ///
    /// Panics when the dates are inverted
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(
            self.school_id,
            self.number,
            self.student_id,
            Currency::KES,
            self.issue_date,
            self.due_date,
            None,
            UserId::new(),
        )
        .unwrap_or_else(|e| panic!("invalid test invoice: {}", e));
        invoice.total_amount = Money::new(self.total, Currency::KES);
        invoice.paid_amount = Money::new(self.paid, Currency::KES);
        invoice.status = self.status;
        invoice
    }
}

/// Builder for payment requests
pub struct PaymentRequestBuilder {
    target: PaymentTarget,
    amount: Decimal,
    currency: Currency,
    payment_date: NaiveDate,
    method: PaymentMethod,
    reference: Option<String>,
}

impl PaymentRequestBuilder {
    /// Student-wide payment
    pub fn for_student(student_id: StudentId, amount: Decimal) -> Self {
        Self::new(PaymentTarget::Student(student_id), amount)
    }

    /// Direct payment to one invoice
    pub fn for_invoice(invoice_id: InvoiceId, amount: Decimal) -> Self {
        Self::new(PaymentTarget::Invoice(invoice_id), amount)
    }

    fn new(target: PaymentTarget, amount: Decimal) -> Self {
        Self {
            target,
            amount,
            currency: Currency::KES,
            payment_date: DateFixtures::today(),
            method: PaymentMethod::MobileMoney,
            reference: None,
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn build(self) -> RecordPaymentRequest {
        let request = RecordPaymentRequest::new(self.target, self.amount, self.currency, self.payment_date, self.method);
        match self.reference {
            Some(reference) => request.with_reference(reference),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fee_structure_request() {
        let school = SchoolFixture::new();
        let request = FeeStructureRequestBuilder::new(&school).build();
        assert_eq!(request.components.len(), 2);
        assert_eq!(request.class_id, Some(school.class_id));
        assert!(request.amount.is_none());
    }

    #[test]
    fn test_flat_and_level_scope() {
        let school = SchoolFixture::new();
        let request = FeeStructureRequestBuilder::new(&school)
            .flat(dec!(5000))
            .for_level(school.school_level_id)
            .build();
        assert!(request.components.is_empty());
        assert_eq!(request.amount, Some(dec!(5000)));
        assert!(request.class_id.is_none());
    }

    #[test]
    fn test_invoice_builder_sets_figures() {
        let invoice = TestInvoiceBuilder::new()
            .total(dec!(700))
            .paid(dec!(200))
            .status(InvoiceStatus::PartiallyPaid)
            .build();
        assert_eq!(invoice.outstanding().unwrap(), Money::new(dec!(500), Currency::KES));
    }

    #[test]
    fn test_payment_builder_keeps_reference() {
        let request = PaymentRequestBuilder::for_student(StudentId::new(), dec!(100))
            .with_reference("MPESA-QX12")
            .build();
        assert_eq!(request.reference.as_deref(), Some("MPESA-QX12"));
        assert!(request.validate().is_ok());
    }
}
