//! Property-Based Test Generators
//!
//! proptest strategies for ledger data that respect the domain invariants:
//! positive amounts, ordered dates, and open balances in a single currency.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use core_kernel::{Currency, InvoiceId, Money};
use domain_billing::{InvoiceStatus, OpenBalance, PaymentMethod};

use crate::fixtures::ymd;

/// Strategy for generating supported Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::KES),
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::NGN),
        Just(Currency::ZAR),
        Just(Currency::INR),
        Just(Currency::JPY),
    ]
}

/// Positive amounts in minor units, up to one million major units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

/// Positive KES amounts
pub fn kes_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|minor| Money::from_minor(minor, Currency::KES))
}

/// Non-negative KES amounts, zero included
pub fn kes_money_or_zero_strategy() -> impl Strategy<Value = Money> {
    (0i64..100_000_000i64).prop_map(|minor| Money::from_minor(minor, Currency::KES))
}

/// Dates within the 2025 and 2026 school years
pub fn school_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..730).prop_map(|offset| ymd(2025, 1, 1) + Duration::days(offset))
}

/// An (issue, due) pair with due on or after issue
pub fn issue_due_strategy() -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (school_date_strategy(), 0i64..120).prop_map(|(issue, term)| (issue, issue + Duration::days(term)))
}

/// One positive open balance in KES
pub fn open_balance_strategy() -> impl Strategy<Value = OpenBalance> {
    (issue_due_strategy(), kes_money_strategy()).prop_map(|((issue_date, due_date), outstanding)| OpenBalance {
        invoice_id: InvoiceId::new(),
        due_date,
        issue_date,
        outstanding,
    })
}

/// A student's open balances, possibly none
pub fn open_balances_strategy(max: usize) -> impl Strategy<Value = Vec<OpenBalance>> {
    prop::collection::vec(open_balance_strategy(), 0..=max)
}

pub fn invoice_status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop::sample::select(InvoiceStatus::ALL.to_vec())
}

/// Statuses that still accept payments and item edits
pub fn open_status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Draft),
        Just(InvoiceStatus::Sent),
        Just(InvoiceStatus::PartiallyPaid),
        Just(InvoiceStatus::Overdue),
    ]
}

pub fn payment_method_strategy() -> impl Strategy<Value = PaymentMethod> {
    prop_oneof![
        Just(PaymentMethod::Cash),
        Just(PaymentMethod::BankTransfer),
        Just(PaymentMethod::MobileMoney),
        Just(PaymentMethod::Card),
        Just(PaymentMethod::Cheque),
    ]
}

/// Item quantities
pub fn quantity_strategy() -> impl Strategy<Value = u32> {
    1u32..50
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn kes_money_is_positive(money in kes_money_strategy()) {
            prop_assert!(money.is_positive());
            prop_assert_eq!(money.currency(), Currency::KES);
        }

        #[test]
        fn due_never_precedes_issue((issue, due) in issue_due_strategy()) {
            prop_assert!(due >= issue);
        }

        #[test]
        fn open_statuses_are_not_terminal(status in open_status_strategy()) {
            prop_assert!(!status.is_terminal());
        }

        #[test]
        fn open_balances_are_positive(balances in open_balances_strategy(6)) {
            prop_assert!(balances.len() <= 6);
            for balance in &balances {
                prop_assert!(balance.outstanding.is_positive());
            }
        }
    }
}
