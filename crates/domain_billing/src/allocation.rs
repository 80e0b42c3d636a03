//! Payment allocation policy
//!
//! Distributes a payment over a student's open balances, earliest due date
//! first and earliest issue date as the tie-breaker. Whatever is left once
//! every balance is covered is reported as unapplied.

use chrono::NaiveDate;

use core_kernel::{InvoiceId, Money};

use crate::error::BillingError;

/// An invoice's open balance as seen by the allocator
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBalance {
    pub invoice_id: InvoiceId,
    pub due_date: NaiveDate,
    pub issue_date: NaiveDate,
    pub outstanding: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationLine {
    pub invoice_id: InvoiceId,
    pub amount: Money,
}

/// Result of running the waterfall
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub lines: Vec<AllocationLine>,
    pub allocated: Money,
    pub unapplied: Money,
}

/// Plans a waterfall allocation of `payment` across `balances`
///
/// Balances with nothing outstanding get no line. The sort is stable, so
/// callers that already order by due and issue date keep their order.
///
/// # Errors
///
/// Fails when a balance is in a different currency from the payment.
pub fn waterfall(payment: &Money, balances: &[OpenBalance]) -> Result<AllocationPlan, BillingError> {
    let mut ordered: Vec<&OpenBalance> = balances.iter().collect();
    ordered.sort_by_key(|b| (b.due_date, b.issue_date));

    let mut remaining = *payment;
    let mut lines = Vec::new();

    for balance in ordered {
        if !remaining.is_positive() {
            break;
        }
        if !balance.outstanding.is_positive() {
            continue;
        }
        let apply = balance.outstanding.checked_min(&remaining)?;
        remaining = remaining.checked_sub(&apply)?;
        lines.push(AllocationLine {
            invoice_id: balance.invoice_id,
            amount: apply,
        });
    }

    let allocated = payment.checked_sub(&remaining)?;
    Ok(AllocationPlan {
        lines,
        allocated,
        unapplied: remaining,
    })
}
