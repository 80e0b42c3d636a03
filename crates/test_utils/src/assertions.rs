//! Custom Test Assertions
//!
//! Assertion helpers for ledger types that give more meaningful failure
//! messages than a bare `assert_eq!` on nested structs.

use rust_decimal::Decimal;

use core_kernel::{Currency, Money};
use domain_billing::{AgingReport, InvoiceDetail, InvoiceStatus};

/// Asserts that a Money value has the given amount and currency
pub fn assert_money_eq(actual: &Money, amount: Decimal, currency: Currency) {
    assert_eq!(
        actual.currency(),
        currency,
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        currency
    );
    assert_eq!(
        actual.amount(),
        amount,
        "Amount mismatch: actual={} {}, expected={} {}",
        actual.currency().symbol(),
        actual.amount(),
        currency.symbol(),
        amount
    );
}

/// Asserts that a Money value is positive
pub fn assert_money_positive(money: &Money) {
    assert!(
        money.is_positive(),
        "Expected positive money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts that money values sum to a total
///
/// # Panics
///
/// Panics if the currencies differ or the sum doesn't equal the total
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts.iter()).expect("Currency mismatch in sum");
    assert_eq!(
        sum.amount(),
        total.amount(),
        "Sum of parts ({}) doesn't equal total ({})",
        sum.amount(),
        total.amount()
    );
}

/// Asserts the ledger invariants of one invoice
///
/// The header total equals the sum of item totals, the paid amount equals
/// the sum of allocations, and paid never exceeds total.
pub fn assert_invoice_consistent(detail: &InvoiceDetail) {
    let invoice = &detail.invoice;
    let item_sum = Money::sum(invoice.currency, detail.items.iter().map(|i| &i.total_price))
        .expect("item currency differs from invoice");
    assert_eq!(
        invoice.total_amount, item_sum,
        "Invoice {} total {} does not match item sum {}",
        invoice.invoice_number,
        invoice.total_amount.amount(),
        item_sum.amount()
    );

    let allocated = Money::sum(invoice.currency, detail.allocations.iter().map(|a| &a.amount))
        .expect("allocation currency differs from invoice");
    assert_eq!(
        invoice.paid_amount, allocated,
        "Invoice {} paid {} does not match allocations {}",
        invoice.invoice_number,
        invoice.paid_amount.amount(),
        allocated.amount()
    );

    assert!(
        invoice.paid_amount.amount() <= invoice.total_amount.amount(),
        "Invoice {} is overpaid: paid {} of {}",
        invoice.invoice_number,
        invoice.paid_amount.amount(),
        invoice.total_amount.amount()
    );
}

/// Asserts an invoice's status with its figures in the failure message
pub fn assert_invoice_status(detail: &InvoiceDetail, expected: InvoiceStatus) {
    let invoice = &detail.invoice;
    assert_eq!(
        invoice.status,
        expected,
        "Invoice {} is {} (total {}, paid {}, due {}), expected {}",
        invoice.invoice_number,
        invoice.status,
        invoice.total_amount.amount(),
        invoice.paid_amount.amount(),
        invoice.due_date,
        expected
    );
}

/// Asserts that an aging report's buckets add up to its totals
pub fn assert_aging_consistent(report: &AgingReport) {
    let count: usize = report.buckets.iter().map(|b| b.invoice_count).sum();
    assert_eq!(count, report.invoice_count, "Bucket counts do not add up");

    let outstanding: Vec<Money> = report.buckets.iter().map(|b| b.outstanding).collect();
    assert_money_sum_equals(&outstanding, &report.total_outstanding);
}

/// Asserts that a result is Ok and returns the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Asserts that a result is Err and returns the error
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}

/// Asserts that an error matches a specific variant
#[macro_export]
macro_rules! assert_err_variant {
    ($result:expr, $pattern:pat) => {
        match $result {
            Ok(value) => panic!("Expected Err matching {}, got Ok({:?})", stringify!($pattern), value),
            Err(ref e) => {
                assert!(
                    matches!(e, $pattern),
                    "Error {:?} does not match pattern {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::TestInvoiceBuilder;
    use crate::fixtures::{ymd, MoneyFixtures};
    use domain_billing::BillingError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_assert_money_eq_passes() {
        assert_money_eq(&MoneyFixtures::kes_term_fee(), dec!(1500), Currency::KES);
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_assert_money_eq_currency_mismatch() {
        assert_money_eq(&MoneyFixtures::usd_100(), dec!(100), Currency::KES);
    }

    #[test]
    #[should_panic(expected = "Expected positive money")]
    fn test_assert_money_positive_fails_for_zero() {
        assert_money_positive(&MoneyFixtures::kes_zero());
    }

    #[test]
    fn test_assert_money_sum_equals() {
        let parts = vec![MoneyFixtures::kes_tuition(), MoneyFixtures::kes_activity()];
        assert_money_sum_equals(&parts, &MoneyFixtures::kes_term_fee());
    }

    #[test]
    #[should_panic(expected = "does not match item sum")]
    fn test_invoice_without_items_but_with_total_is_inconsistent() {
        let detail = InvoiceDetail {
            invoice: TestInvoiceBuilder::new().total(dec!(500)).build(),
            items: Vec::new(),
            allocations: Vec::new(),
        };
        assert_invoice_consistent(&detail);
    }

    #[test]
    fn test_aging_report_of_open_invoices_is_consistent() {
        let invoices = vec![
            TestInvoiceBuilder::new().status(InvoiceStatus::Sent).build(),
            TestInvoiceBuilder::new()
                .due(ymd(2025, 11, 1))
                .status(InvoiceStatus::Overdue)
                .build(),
        ];
        let report = AgingReport::build(Currency::KES, invoices.iter(), ymd(2026, 3, 1)).unwrap();
        assert_aging_consistent(&report);
        assert_eq!(report.invoice_count, 2);
    }

    #[test]
    fn test_assert_err_variant_matches() {
        let result: Result<(), BillingError> = Err(BillingError::validation("bad"));
        assert_err_variant!(result, BillingError::Validation(_));
    }
}
