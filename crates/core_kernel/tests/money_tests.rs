//! Unit tests for the Money module
//!
//! Tests cover creation, checked arithmetic, comparison, currency
//! handling and display formatting.

use core_kernel::{Money, Currency, MoneyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cmp::Ordering;

mod creation {
    use super::*;

    #[test]
    fn test_new_creates_money_with_correct_amount() {
        let m = Money::new(dec!(100.50), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789), Currency::USD);
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_from_minor_handles_jpy_no_decimals() {
        let m = Money::from_minor(10000, Currency::JPY);
        assert_eq!(m.amount(), dec!(10000));
    }

    #[test]
    fn test_zero_is_neither_positive_nor_negative() {
        let m = Money::zero(Currency::KES);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_sub_can_go_negative() {
        let a = Money::new(dec!(50), Currency::USD);
        let b = Money::new(dec!(80), Currency::USD);
        let diff = a.checked_sub(&b).unwrap();
        assert!(diff.is_negative());
        assert_eq!(diff.amount(), dec!(-30));
    }

    #[test]
    fn test_times_zero_quantity_is_zero() {
        let unit = Money::new(dec!(99.99), Currency::USD);
        assert!(unit.times(0).unwrap().is_zero());
    }

    #[test]
    fn test_times_overflow_is_reported() {
        let unit = Money::new(Decimal::MAX, Currency::USD);
        assert_eq!(unit.times(10), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_sum_of_components() {
        let parts = vec![
            Money::new(dec!(1200), Currency::KES),
            Money::new(dec!(300), Currency::KES),
        ];
        let total = Money::sum(Currency::KES, &parts).unwrap();
        assert_eq!(total.amount(), dec!(1500));
    }

    #[test]
    fn test_sum_rejects_mixed_currencies() {
        let parts = vec![
            Money::new(dec!(1), Currency::KES),
            Money::new(dec!(1), Currency::USD),
        ];
        assert!(matches!(
            Money::sum(Currency::KES, &parts),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_checked_cmp() {
        let a = Money::new(dec!(10), Currency::USD);
        let b = Money::new(dec!(10.00), Currency::USD);
        assert_eq!(a.checked_cmp(&b).unwrap(), Ordering::Equal);
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_currency_parsing_is_case_insensitive() {
        assert_eq!("kes".parse::<Currency>().unwrap(), Currency::KES);
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::USD);
    }

    #[test]
    fn test_unknown_currency() {
        let err = "XYZ".parse::<Currency>().unwrap_err();
        assert_eq!(err, MoneyError::UnknownCurrency("XYZ".to_string()));
    }

    #[test]
    fn test_money_display_jpy() {
        let m = Money::new(dec!(5000), Currency::JPY);
        assert_eq!(m.to_string(), "¥ 5000");
    }

    #[test]
    fn test_money_json_roundtrip() {
        let m = Money::new(dec!(1500.25), Currency::NGN);
        let json = serde_json::to_string(&m).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
