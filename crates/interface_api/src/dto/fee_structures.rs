//! Fee structure DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{AcademicYearId, ClassId, FeeStructureId, InventoryItemId, SchoolLevelId, StudentId};
use domain_billing as billing;
use domain_billing::{FeeFrequency, FeeStructure, GenerationReport, StudentFeeAssignment};

use super::parse_currency;
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct FeeComponentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub amount: Decimal,
    pub inventory_item_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeeStructureRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Flat amount. With components it is optional and, when given, must
    /// equal their sum
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[validate(nested)]
    pub components: Vec<FeeComponentRequest>,
    pub frequency: String,
    pub academic_year_id: Uuid,
    pub class_id: Option<Uuid>,
    pub school_level_id: Option<Uuid>,
}

impl CreateFeeStructureRequest {
    pub fn into_domain(self) -> Result<billing::CreateFeeStructureRequest, ApiError> {
        Ok(billing::CreateFeeStructureRequest {
            name: self.name,
            description: self.description,
            currency: parse_currency(&self.currency)?,
            amount: self.amount,
            components: self
                .components
                .into_iter()
                .map(|c| billing::NewFeeComponent {
                    name: c.name,
                    amount: c.amount,
                    inventory_item_id: c.inventory_item_id.map(InventoryItemId::from_uuid),
                })
                .collect(),
            frequency: FeeFrequency::parse(&self.frequency)?,
            academic_year_id: AcademicYearId::from_uuid(self.academic_year_id),
            class_id: self.class_id.map(ClassId::from_uuid),
            school_level_id: self.school_level_id.map(SchoolLevelId::from_uuid),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignFeeRequest {
    pub student_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoicesRequest {
    pub academic_year_id: Uuid,
    /// Restrict generation to these students
    pub student_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default)]
    pub include_inactive_assignments: bool,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl GenerateInvoicesRequest {
    pub fn into_domain(self, fee_structure_id: Uuid) -> billing::GenerateInvoicesRequest {
        let mut request = billing::GenerateInvoicesRequest::new(
            FeeStructureId::from_uuid(fee_structure_id),
            AcademicYearId::from_uuid(self.academic_year_id),
            self.issue_date,
            self.due_date,
        );
        request.student_ids = self
            .student_ids
            .map(|ids| ids.into_iter().map(StudentId::from_uuid).collect());
        request.dry_run = self.dry_run;
        request.overwrite_existing = self.overwrite_existing;
        request.include_inactive_assignments = self.include_inactive_assignments;
        request
    }
}

#[derive(Debug, Serialize)]
pub struct FeeComponentResponse {
    pub id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub inventory_item_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct FeeStructureResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    pub amount: Decimal,
    pub frequency: String,
    pub academic_year_id: Uuid,
    pub class_id: Option<Uuid>,
    pub school_level_id: Option<Uuid>,
    pub is_active: bool,
    pub components: Vec<FeeComponentResponse>,
    pub created_at: DateTime<Utc>,
}

impl From<FeeStructure> for FeeStructureResponse {
    fn from(structure: FeeStructure) -> Self {
        Self {
            id: structure.id.into(),
            currency: structure.currency().code().to_string(),
            amount: structure.amount.amount(),
            frequency: structure.frequency.as_str().to_string(),
            academic_year_id: structure.scope.academic_year_id().into(),
            class_id: structure.scope.class_id().map(Uuid::from),
            school_level_id: structure.scope.school_level_id().map(Uuid::from),
            is_active: structure.is_active,
            components: structure
                .components
                .into_iter()
                .map(|c| FeeComponentResponse {
                    id: c.id.into(),
                    name: c.name,
                    amount: c.amount.amount(),
                    inventory_item_id: c.inventory_item_id.map(Uuid::from),
                })
                .collect(),
            name: structure.name,
            description: structure.description,
            created_at: structure.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub fee_structure_id: Uuid,
    pub academic_year_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<StudentFeeAssignment> for AssignmentResponse {
    fn from(assignment: StudentFeeAssignment) -> Self {
        Self {
            id: assignment.id.into(),
            student_id: assignment.student_id.into(),
            fee_structure_id: assignment.fee_structure_id.into(),
            academic_year_id: assignment.academic_year_id.into(),
            is_active: assignment.is_active,
            created_at: assignment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationFailureResponse {
    pub student_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationReportResponse {
    pub created: usize,
    pub skipped: usize,
    pub failed: Vec<GenerationFailureResponse>,
    pub total_amount: Decimal,
    pub currency: String,
    pub dry_run: bool,
    pub invoice_ids: Vec<Uuid>,
}

impl From<GenerationReport> for GenerationReportResponse {
    fn from(report: GenerationReport) -> Self {
        Self {
            created: report.created,
            skipped: report.skipped,
            failed: report
                .failed
                .into_iter()
                .map(|f| GenerationFailureResponse {
                    student_id: f.student_id.into(),
                    reason: f.reason,
                })
                .collect(),
            total_amount: report.total_amount.amount(),
            currency: report.total_amount.currency().code().to_string(),
            dry_run: report.dry_run,
            invoice_ids: report.invoice_ids.into_iter().map(Uuid::from).collect(),
        }
    }
}
