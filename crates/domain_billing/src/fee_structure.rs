//! Fee structures, student assignments and the fee resolver
//!
//! A fee structure is a reusable billing template scoped to an academic
//! year and either a class or a school level. It is billed either as one
//! flat line or as an ordered list of components that must add up to the
//! structure amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    AcademicYearId, AssignmentId, ClassId, Currency, FeeComponentId, FeeStructureId,
    InventoryItemId, Money, SchoolId, SchoolLevelId, StudentId,
};

use crate::error::BillingError;

/// How often a fee is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeFrequency {
    OneTime,
    Monthly,
    Termly,
    Annually,
}

impl FeeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeFrequency::OneTime => "one_time",
            FeeFrequency::Monthly => "monthly",
            FeeFrequency::Termly => "termly",
            FeeFrequency::Annually => "annually",
        }
    }

    pub fn parse(value: &str) -> Result<Self, BillingError> {
        match value {
            "one_time" => Ok(FeeFrequency::OneTime),
            "monthly" => Ok(FeeFrequency::Monthly),
            "termly" => Ok(FeeFrequency::Termly),
            "annually" => Ok(FeeFrequency::Annually),
            other => Err(BillingError::validation(format!("Unknown fee frequency: {}", other))),
        }
    }
}

/// Who a fee structure applies to
///
/// Exactly one of class or school level; holding both is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeScope {
    Class {
        academic_year_id: AcademicYearId,
        class_id: ClassId,
    },
    SchoolLevel {
        academic_year_id: AcademicYearId,
        school_level_id: SchoolLevelId,
    },
}

impl FeeScope {
    /// Builds a scope from the nullable columns/fields used by storage and the API
    pub fn from_parts(
        academic_year_id: AcademicYearId,
        class_id: Option<ClassId>,
        school_level_id: Option<SchoolLevelId>,
    ) -> Result<Self, BillingError> {
        match (class_id, school_level_id) {
            (Some(class_id), None) => Ok(FeeScope::Class { academic_year_id, class_id }),
            (None, Some(school_level_id)) => Ok(FeeScope::SchoolLevel { academic_year_id, school_level_id }),
            (Some(_), Some(_)) => Err(BillingError::validation(
                "Fee structure scope cannot target both a class and a school level",
            )),
            (None, None) => Err(BillingError::validation(
                "Fee structure scope requires a class or a school level",
            )),
        }
    }

    pub fn academic_year_id(&self) -> AcademicYearId {
        match self {
            FeeScope::Class { academic_year_id, .. } => *academic_year_id,
            FeeScope::SchoolLevel { academic_year_id, .. } => *academic_year_id,
        }
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            FeeScope::Class { class_id, .. } => Some(*class_id),
            FeeScope::SchoolLevel { .. } => None,
        }
    }

    pub fn school_level_id(&self) -> Option<SchoolLevelId> {
        match self {
            FeeScope::Class { .. } => None,
            FeeScope::SchoolLevel { school_level_id, .. } => Some(*school_level_id),
        }
    }
}

/// One itemized part of a fee structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeComponent {
    pub id: FeeComponentId,
    pub name: String,
    pub amount: Money,
    /// Stock item handed out with this component (uniform, textbook pack)
    pub inventory_item_id: Option<InventoryItemId>,
}

impl FeeComponent {
    pub fn new(name: impl Into<String>, amount: Money) -> Self {
        Self {
            id: FeeComponentId::new_v7(),
            name: name.into(),
            amount,
            inventory_item_id: None,
        }
    }

    pub fn with_inventory_item(mut self, inventory_item_id: InventoryItemId) -> Self {
        self.inventory_item_id = Some(inventory_item_id);
        self
    }
}

/// A reusable billing template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    pub id: FeeStructureId,
    pub school_id: SchoolId,
    pub name: String,
    pub description: Option<String>,
    /// Flat amount, or the parent amount the components add up to
    pub amount: Money,
    /// Ordered components; empty for a flat fee
    pub components: Vec<FeeComponent>,
    pub frequency: FeeFrequency,
    pub scope: FeeScope,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl FeeStructure {
    /// Creates a flat fee structure
    pub fn flat(
        school_id: SchoolId,
        name: impl Into<String>,
        amount: Money,
        frequency: FeeFrequency,
        scope: FeeScope,
    ) -> Self {
        Self {
            id: FeeStructureId::new_v7(),
            school_id,
            name: name.into(),
            description: None,
            amount,
            components: Vec::new(),
            frequency,
            scope,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Creates an itemized fee structure whose amount is the sum of its components
    pub fn itemized(
        school_id: SchoolId,
        name: impl Into<String>,
        components: Vec<FeeComponent>,
        frequency: FeeFrequency,
        scope: FeeScope,
    ) -> Result<Self, BillingError> {
        let currency = components
            .first()
            .map(|c| c.amount.currency())
            .ok_or_else(|| BillingError::validation("An itemized fee structure needs at least one component"))?;
        let amount = Money::sum(currency, components.iter().map(|c| &c.amount))?;

        let mut structure = Self::flat(school_id, name, amount, frequency, scope);
        structure.components = components;
        Ok(structure)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    pub fn is_itemized(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn component_ids(&self) -> Vec<FeeComponentId> {
        self.components.iter().map(|c| c.id).collect()
    }

    /// Save-time validation
    ///
    /// Component amounts must add up to the structure amount; the resolver
    /// trusts this when it bills.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.name.trim().is_empty() {
            return Err(BillingError::validation("Fee structure name is required"));
        }
        if self.amount.is_negative() {
            return Err(BillingError::validation("Fee structure amount cannot be negative"));
        }

        if self.components.is_empty() {
            return Ok(());
        }

        for component in &self.components {
            if component.name.trim().is_empty() {
                return Err(BillingError::validation("Fee component name is required"));
            }
            if component.amount.is_negative() {
                return Err(BillingError::validation(format!(
                    "Fee component '{}' cannot have a negative amount",
                    component.name
                )));
            }
        }

        let sum = Money::sum(self.currency(), self.components.iter().map(|c| &c.amount))?;
        if sum != self.amount {
            return Err(BillingError::validation(format!(
                "Fee components add up to {} but the structure amount is {}",
                sum, self.amount
            )));
        }

        Ok(())
    }
}

/// Links a student to a fee structure for an academic year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentFeeAssignment {
    pub id: AssignmentId,
    pub school_id: SchoolId,
    pub student_id: StudentId,
    pub fee_structure_id: FeeStructureId,
    pub academic_year_id: AcademicYearId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl StudentFeeAssignment {
    pub fn new(
        school_id: SchoolId,
        student_id: StudentId,
        fee_structure_id: FeeStructureId,
        academic_year_id: AcademicYearId,
    ) -> Self {
        Self {
            id: AssignmentId::new_v7(),
            school_id,
            student_id,
            fee_structure_id,
            academic_year_id,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Where a student sits in a given academic year
///
/// Owned by the enrollment module; read here for scope checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentBillingContext {
    pub school_id: SchoolId,
    pub student_id: StudentId,
    pub academic_year_id: AcademicYearId,
    pub class_id: Option<ClassId>,
    pub school_level_id: Option<SchoolLevelId>,
}

/// A billable line produced by the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct BillableLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub fee_structure_id: FeeStructureId,
    pub fee_component_id: Option<FeeComponentId>,
    pub inventory_item_id: Option<InventoryItemId>,
}

impl BillableLine {
    pub fn total(&self) -> Result<Money, BillingError> {
        Ok(self.unit_price.times(self.quantity)?)
    }
}

/// Expands a fee structure into billable lines for one student
///
/// One line per component in order, or a single line named after the
/// structure for a flat fee.
///
/// # Errors
///
/// `ScopeMismatch` when the assignment does not belong to the structure or
/// its year, or the student's enrollment does not match the structure scope.
pub fn resolve_lines(
    structure: &FeeStructure,
    assignment: &StudentFeeAssignment,
    context: Option<&StudentBillingContext>,
) -> Result<Vec<BillableLine>, BillingError> {
    check_scope(structure, assignment, context)?;

    if structure.components.is_empty() {
        return Ok(vec![BillableLine {
            description: structure.name.clone(),
            quantity: 1,
            unit_price: structure.amount,
            fee_structure_id: structure.id,
            fee_component_id: None,
            inventory_item_id: None,
        }]);
    }

    Ok(structure
        .components
        .iter()
        .map(|component| BillableLine {
            description: component.name.clone(),
            quantity: 1,
            unit_price: component.amount,
            fee_structure_id: structure.id,
            fee_component_id: Some(component.id),
            inventory_item_id: component.inventory_item_id,
        })
        .collect())
}

fn check_scope(
    structure: &FeeStructure,
    assignment: &StudentFeeAssignment,
    context: Option<&StudentBillingContext>,
) -> Result<(), BillingError> {
    if assignment.fee_structure_id != structure.id {
        return Err(BillingError::scope_mismatch(format!(
            "Assignment {} does not reference fee structure {}",
            assignment.id, structure.id
        )));
    }

    let year = structure.scope.academic_year_id();
    if assignment.academic_year_id != year {
        return Err(BillingError::scope_mismatch(format!(
            "Assignment year {} differs from fee structure year {}",
            assignment.academic_year_id, year
        )));
    }

    let context = context.ok_or_else(|| {
        BillingError::scope_mismatch(format!(
            "Student {} has no enrollment in academic year {}",
            assignment.student_id, year
        ))
    })?;

    if context.student_id != assignment.student_id || context.academic_year_id != year {
        return Err(BillingError::scope_mismatch(format!(
            "Enrollment record does not belong to student {} in year {}",
            assignment.student_id, year
        )));
    }

    match structure.scope {
        FeeScope::Class { class_id, .. } if context.class_id != Some(class_id) => {
            Err(BillingError::scope_mismatch(format!(
                "Student {} is not enrolled in class {}",
                assignment.student_id, class_id
            )))
        }
        FeeScope::SchoolLevel { school_level_id, .. } if context.school_level_id != Some(school_level_id) => {
            Err(BillingError::scope_mismatch(format!(
                "Student {} is not at school level {}",
                assignment.student_id, school_level_id
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    fn class_scope(year: AcademicYearId, class_id: ClassId) -> FeeScope {
        FeeScope::Class { academic_year_id: year, class_id }
    }

    fn setup() -> (FeeStructure, StudentFeeAssignment, StudentBillingContext) {
        let school = SchoolId::new();
        let year = AcademicYearId::new();
        let class_id = ClassId::new();
        let student = StudentId::new();
        let structure = FeeStructure::itemized(
            school,
            "Term 1 Fees",
            vec![
                FeeComponent::new("Tuition", kes(dec!(1200))),
                FeeComponent::new("Activity", kes(dec!(300))),
            ],
            FeeFrequency::Termly,
            class_scope(year, class_id),
        )
        .unwrap();
        let assignment = StudentFeeAssignment::new(school, student, structure.id, year);
        let context = StudentBillingContext {
            school_id: school,
            student_id: student,
            academic_year_id: year,
            class_id: Some(class_id),
            school_level_id: None,
        };
        (structure, assignment, context)
    }

    #[test]
    fn test_scope_requires_exactly_one_target() {
        let year = AcademicYearId::new();
        assert!(FeeScope::from_parts(year, Some(ClassId::new()), None).is_ok());
        assert!(FeeScope::from_parts(year, None, Some(SchoolLevelId::new())).is_ok());
        assert!(FeeScope::from_parts(year, Some(ClassId::new()), Some(SchoolLevelId::new())).is_err());
        assert!(FeeScope::from_parts(year, None, None).is_err());
    }

    #[test]
    fn test_itemized_lines_follow_component_order() {
        let (structure, assignment, context) = setup();
        let lines = resolve_lines(&structure, &assignment, Some(&context)).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].description, "Tuition");
        assert_eq!(lines[1].description, "Activity");
        assert!(lines.iter().all(|l| l.quantity == 1));
        assert_eq!(lines[0].fee_component_id, Some(structure.components[0].id));

        let total = Money::sum(Currency::KES, lines.iter().map(|l| &l.unit_price)).unwrap();
        assert_eq!(total, structure.amount);
    }

    #[test]
    fn test_flat_structure_yields_single_line() {
        let (mut structure, assignment, context) = setup();
        structure.components.clear();
        structure.amount = kes(dec!(800));

        let lines = resolve_lines(&structure, &assignment, Some(&context)).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].description, "Term 1 Fees");
        assert_eq!(lines[0].unit_price, kes(dec!(800)));
        assert!(lines[0].fee_component_id.is_none());
    }

    #[test]
    fn test_class_mismatch_is_scope_error() {
        let (structure, assignment, mut context) = setup();
        context.class_id = Some(ClassId::new());

        let err = resolve_lines(&structure, &assignment, Some(&context)).unwrap_err();
        assert!(matches!(err, BillingError::ScopeMismatch(_)));
    }

    #[test]
    fn test_missing_enrollment_is_scope_error() {
        let (structure, assignment, _) = setup();
        let err = resolve_lines(&structure, &assignment, None).unwrap_err();
        assert!(matches!(err, BillingError::ScopeMismatch(_)));
    }

    #[test]
    fn test_assignment_year_mismatch_is_scope_error() {
        let (structure, mut assignment, context) = setup();
        assignment.academic_year_id = AcademicYearId::new();
        let err = resolve_lines(&structure, &assignment, Some(&context)).unwrap_err();
        assert!(matches!(err, BillingError::ScopeMismatch(_)));
    }

    #[test]
    fn test_validate_rejects_component_sum_drift() {
        let (mut structure, _, _) = setup();
        assert!(structure.validate().is_ok());

        structure.amount = kes(dec!(1600));
        let err = structure.validate().unwrap_err();
        assert!(matches!(err, BillingError::Validation(ref m) if m.contains("add up")));
    }

    #[test]
    fn test_validate_rejects_negative_component() {
        let (mut structure, _, _) = setup();
        structure.components[1].amount = kes(dec!(-300));
        structure.amount = kes(dec!(900));
        assert!(structure.validate().is_err());
    }

    #[test]
    fn test_frequency_round_trip() {
        for f in [FeeFrequency::OneTime, FeeFrequency::Monthly, FeeFrequency::Termly, FeeFrequency::Annually] {
            assert_eq!(FeeFrequency::parse(f.as_str()).unwrap(), f);
        }
        assert!(FeeFrequency::parse("weekly").is_err());
    }
}
