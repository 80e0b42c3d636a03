//! Pre-built Test Fixtures
//!
//! Ready-to-use, predictable test data for the billing ledger. Dates are
//! fixed so status and aging assertions do not depend on the wall clock.

use chrono::NaiveDate;
use fake::faker::lorem::en::Word;
use fake::Fake;
use rust_decimal_macros::dec;

use core_kernel::{
    AcademicYearId, ClassId, Currency, Money, SchoolId, SchoolLevelId, StudentId, TenantContext, UserId,
};
use domain_billing::StudentBillingContext;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Tuition component of the standard term fee
    pub fn kes_tuition() -> Money {
        Money::new(dec!(1200), Currency::KES)
    }

    /// Activity component of the standard term fee
    pub fn kes_activity() -> Money {
        Money::new(dec!(300), Currency::KES)
    }

    /// Standard term fee (tuition + activity)
    pub fn kes_term_fee() -> Money {
        Money::new(dec!(1500), Currency::KES)
    }

    pub fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    pub fn kes_zero() -> Money {
        Money::zero(Currency::KES)
    }

    /// A USD amount for currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }
}

/// Fixture for billing dates
pub struct DateFixtures;

impl DateFixtures {
    /// Term 1 issue date (5 Jan 2026)
    pub fn issue_date() -> NaiveDate {
        ymd(2026, 1, 5)
    }

    /// Term 1 due date (5 Feb 2026)
    pub fn due_date() -> NaiveDate {
        ymd(2026, 2, 5)
    }

    /// A day between issue and due date
    pub fn today() -> NaiveDate {
        ymd(2026, 1, 15)
    }

    /// A day well past the term 1 due date
    pub fn after_due() -> NaiveDate {
        ymd(2026, 3, 1)
    }
}

/// Builds a date, panicking on an invalid one
pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| panic!("invalid date {}-{}-{}", year, month, day))
}

/// A school with its academic calendar and one class
#[derive(Debug, Clone)]
pub struct SchoolFixture {
    pub ctx: TenantContext,
    pub academic_year_id: AcademicYearId,
    pub class_id: ClassId,
    pub school_level_id: SchoolLevelId,
}

impl SchoolFixture {
    pub fn new() -> Self {
        Self {
            ctx: TenantContext::new(SchoolId::new(), UserId::new()).with_correlation_id("test"),
            academic_year_id: AcademicYearId::new(),
            class_id: ClassId::new(),
            school_level_id: SchoolLevelId::new(),
        }
    }

    pub fn school_id(&self) -> SchoolId {
        self.ctx.school_id
    }

    /// Another tenant, for isolation tests
    pub fn other_school(&self) -> TenantContext {
        TenantContext::new(SchoolId::new(), UserId::new())
    }

    /// Enrollment of a student in this school's class for the year
    pub fn enrollment(&self, student_id: StudentId) -> StudentBillingContext {
        StudentBillingContext {
            school_id: self.ctx.school_id,
            student_id,
            academic_year_id: self.academic_year_id,
            class_id: Some(self.class_id),
            school_level_id: None,
        }
    }

    /// Enrollment by school level only
    pub fn level_enrollment(&self, student_id: StudentId) -> StudentBillingContext {
        StudentBillingContext {
            school_id: self.ctx.school_id,
            student_id,
            academic_year_id: self.academic_year_id,
            class_id: None,
            school_level_id: Some(self.school_level_id),
        }
    }
}

impl Default for SchoolFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A random single-word inventory item name
pub fn inventory_item_name() -> String {
    let word: String = Word().fake();
    format!("{} kit", word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_fee_is_sum_of_components() {
        let sum = MoneyFixtures::kes_tuition()
            .checked_add(&MoneyFixtures::kes_activity())
            .unwrap();
        assert_eq!(sum, MoneyFixtures::kes_term_fee());
    }

    #[test]
    fn test_dates_are_ordered() {
        assert!(DateFixtures::issue_date() < DateFixtures::today());
        assert!(DateFixtures::today() < DateFixtures::due_date());
        assert!(DateFixtures::due_date() < DateFixtures::after_due());
    }

    #[test]
    fn test_enrollment_matches_school() {
        let school = SchoolFixture::new();
        let student = StudentId::new();
        let context = school.enrollment(student);
        assert_eq!(context.school_id, school.school_id());
        assert_eq!(context.class_id, Some(school.class_id));
    }

    #[test]
    fn test_inventory_item_name_is_not_empty() {
        assert!(inventory_item_name().len() > " kit".len());
    }
}
