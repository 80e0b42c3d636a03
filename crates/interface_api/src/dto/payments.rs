//! Payment DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{InvoiceId, StudentId};
use domain_billing as billing;
use domain_billing::{PaymentDetail, PaymentMethod, PaymentReceipt, PaymentTarget};

use super::invoices::AllocationResponse;
use super::parse_currency;
use crate::error::ApiError;

/// Exactly one of `invoice_id` (direct) or `student_id` (student-wide)
#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub invoice_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub amount: Decimal,
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Defaults to today
    pub payment_date: Option<NaiveDate>,
    pub method: String,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl RecordPaymentRequest {
    pub fn into_domain(self, today: NaiveDate) -> Result<billing::RecordPaymentRequest, ApiError> {
        let target = PaymentTarget::from_parts(
            self.invoice_id.map(InvoiceId::from_uuid),
            self.student_id.map(StudentId::from_uuid),
        )?;
        let mut request = billing::RecordPaymentRequest::new(
            target,
            self.amount,
            parse_currency(&self.currency)?,
            self.payment_date.unwrap_or(today),
            PaymentMethod::parse(&self.method)?,
        );
        request.reference = self.reference;
        request.notes = self.notes;
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentReceiptResponse {
    pub payment_id: Uuid,
    pub allocations: usize,
    pub allocated: Decimal,
    pub unapplied: Decimal,
    pub currency: String,
}

impl From<PaymentReceipt> for PaymentReceiptResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            payment_id: receipt.payment_id.into(),
            allocations: receipt.allocations,
            allocated: receipt.allocated.amount(),
            unapplied: receipt.unapplied.amount(),
            currency: receipt.allocated.currency().code().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub allocations: Vec<AllocationResponse>,
}

impl From<PaymentDetail> for PaymentResponse {
    fn from(detail: PaymentDetail) -> Self {
        let payment = detail.payment;
        Self {
            id: payment.id.into(),
            student_id: payment.student_id.into(),
            amount: payment.amount.amount(),
            currency: payment.amount.currency().code().to_string(),
            payment_date: payment.payment_date,
            method: payment.method.as_str().to_string(),
            reference: payment.reference,
            notes: payment.notes,
            processed_by: payment.processed_by.into(),
            created_at: payment.created_at,
            allocations: detail.allocations.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn body(invoice_id: Option<Uuid>, student_id: Option<Uuid>) -> RecordPaymentRequest {
        RecordPaymentRequest {
            invoice_id,
            student_id,
            amount: dec!(1000),
            currency: "KES".into(),
            payment_date: None,
            method: "mobile_money".into(),
            reference: Some("MPESA-1".into()),
            notes: None,
        }
    }

    #[test]
    fn test_student_payment_defaults_date_to_today() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let request = body(None, Some(Uuid::new_v4())).into_domain(today).unwrap();
        assert_eq!(request.payment_date, today);
        assert!(matches!(request.target, PaymentTarget::Student(_)));
        assert_eq!(request.method, PaymentMethod::MobileMoney);
    }

    #[test]
    fn test_both_targets_are_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert!(body(Some(Uuid::new_v4()), Some(Uuid::new_v4())).into_domain(today).is_err());
        assert!(body(None, None).into_domain(today).is_err());
    }
}
