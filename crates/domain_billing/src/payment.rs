//! Payments and payment allocations
//!
//! A payment is immutable once recorded. Its allocations spread the amount
//! over one or more invoices of the same student.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AllocationId, Currency, InvoiceId, Money, PaymentId, SchoolId, StudentId, UserId};

use crate::error::BillingError;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    MobileMoney,
    /// Check/cheque
    Cheque,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self, BillingError> {
        match value {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "cheque" => Ok(PaymentMethod::Cheque),
            "other" => Ok(PaymentMethod::Other),
            other => Err(BillingError::validation(format!("Unknown payment method: {}", other))),
        }
    }
}

/// A payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub school_id: SchoolId,
    /// Student whose ledger the payment was applied to
    pub student_id: StudentId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    /// External reference (bank ref, M-Pesa code, cheque number)
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Portion of a payment applied to one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: AllocationId,
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl PaymentAllocation {
    pub fn new(payment_id: PaymentId, invoice_id: InvoiceId, amount: Money) -> Self {
        Self {
            id: AllocationId::new_v7(),
            payment_id,
            invoice_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Where a payment should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    /// Direct mode: a single invoice, capped at its balance
    Invoice(InvoiceId),
    /// Student-wide mode: the student's open invoices, oldest due first
    Student(StudentId),
}

impl PaymentTarget {
    /// Exactly one of the two must be given
    pub fn from_parts(invoice_id: Option<InvoiceId>, student_id: Option<StudentId>) -> Result<Self, BillingError> {
        match (invoice_id, student_id) {
            (Some(invoice_id), None) => Ok(PaymentTarget::Invoice(invoice_id)),
            (None, Some(student_id)) => Ok(PaymentTarget::Student(student_id)),
            (Some(_), Some(_)) => Err(BillingError::validation(
                "A payment targets either an invoice or a student, not both",
            )),
            (None, None) => Err(BillingError::validation(
                "A payment requires an invoice or a student",
            )),
        }
    }
}

/// Input for recording a payment
#[derive(Debug, Clone)]
pub struct RecordPaymentRequest {
    pub target: PaymentTarget,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl RecordPaymentRequest {
    pub fn new(
        target: PaymentTarget,
        amount: Decimal,
        currency: Currency,
        payment_date: NaiveDate,
        method: PaymentMethod,
    ) -> Self {
        Self {
            target,
            amount,
            currency,
            payment_date,
            method,
            reference: None,
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Amounts must be positive and expressible in the currency's minor
    /// unit, so the stored payment equals the amount received.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.amount <= Decimal::ZERO {
            return Err(BillingError::validation("Payment amount must be greater than zero"));
        }
        let places = self.currency.decimal_places();
        if self.amount.normalize().scale() > places {
            return Err(BillingError::validation(format!(
                "Payment amount {} has more than {} decimal places for {}",
                self.amount, places, self.currency
            )));
        }
        Ok(())
    }
}

/// Outcome of recording a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: PaymentId,
    /// Number of allocation rows written
    pub allocations: usize,
    pub allocated: Money,
    /// Remainder not applied to any invoice; not kept as credit
    pub unapplied: Money,
}

/// Payment with its allocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetail {
    pub payment: Payment,
    pub allocations: Vec<PaymentAllocation>,
}
