//! Fee structure and assignment setup

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

use core_kernel::{
    AcademicYearId, AssignmentId, ClassId, Currency, FeeStructureId, InventoryItemId, Money,
    SchoolLevelId, StudentId, TenantContext,
};

use crate::error::BillingError;
use crate::fee_structure::{FeeComponent, FeeFrequency, FeeScope, FeeStructure, StudentFeeAssignment};
use crate::ports::LedgerPort;

/// Input for one fee component
#[derive(Debug, Clone)]
pub struct NewFeeComponent {
    pub name: String,
    pub amount: Decimal,
    pub inventory_item_id: Option<InventoryItemId>,
}

/// Input for a new fee structure
///
/// Either `amount` for a flat fee, or `components`. When both are given the
/// components must add up to `amount`.
#[derive(Debug, Clone)]
pub struct CreateFeeStructureRequest {
    pub name: String,
    pub description: Option<String>,
    pub currency: Currency,
    pub amount: Option<Decimal>,
    pub components: Vec<NewFeeComponent>,
    pub frequency: FeeFrequency,
    pub academic_year_id: AcademicYearId,
    pub class_id: Option<ClassId>,
    pub school_level_id: Option<SchoolLevelId>,
}

#[derive(Debug, Clone)]
pub struct AssignFeeRequest {
    pub student_id: StudentId,
    pub fee_structure_id: FeeStructureId,
}

/// Creates fee structures and links students to them
#[derive(Clone)]
pub struct FeeSetupService {
    ledger: Arc<dyn LedgerPort>,
}

impl FeeSetupService {
    pub fn new(ledger: Arc<dyn LedgerPort>) -> Self {
        Self { ledger }
    }

    /// Validates and saves a fee structure
    ///
    /// Linked inventory items must exist in the school.
    #[instrument(skip(self, ctx, request), fields(school_id = %ctx.school_id, name = %request.name))]
    pub async fn create_fee_structure(
        &self,
        ctx: &TenantContext,
        request: CreateFeeStructureRequest,
    ) -> Result<FeeStructure, BillingError> {
        let structure = build_structure(ctx, request)?;
        structure.validate()?;

        let mut uow = self.ledger.begin(ctx.school_id).await?;
        for component in &structure.components {
            if let Some(item_id) = component.inventory_item_id {
                if uow.lock_inventory_item(item_id).await?.is_none() {
                    return Err(BillingError::not_found("InventoryItem", item_id));
                }
            }
        }
        uow.insert_fee_structure(&structure).await?;
        uow.commit().await?;

        info!(
            fee_structure_id = %structure.id,
            amount = %structure.amount,
            components = structure.components.len(),
            "Fee structure created"
        );
        Ok(structure)
    }

    pub async fn get_fee_structure(
        &self,
        ctx: &TenantContext,
        id: FeeStructureId,
    ) -> Result<FeeStructure, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        uow.fee_structure(id)
            .await?
            .ok_or_else(|| BillingError::not_found("FeeStructure", id))
    }

    /// Assigns a student to a structure for the structure's academic year
    #[instrument(skip(self, ctx, request), fields(school_id = %ctx.school_id, student_id = %request.student_id))]
    pub async fn assign(
        &self,
        ctx: &TenantContext,
        request: AssignFeeRequest,
    ) -> Result<StudentFeeAssignment, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let structure = uow
            .fee_structure(request.fee_structure_id)
            .await?
            .ok_or_else(|| BillingError::not_found("FeeStructure", request.fee_structure_id))?;
        if !structure.is_active {
            return Err(BillingError::validation(format!(
                "Fee structure {} is inactive",
                structure.name
            )));
        }

        let assignment = StudentFeeAssignment::new(
            ctx.school_id,
            request.student_id,
            structure.id,
            structure.scope.academic_year_id(),
        );
        uow.insert_assignment(&assignment).await?;
        uow.commit().await?;

        info!(assignment_id = %assignment.id, fee_structure_id = %structure.id, "Fee assigned");
        Ok(assignment)
    }

    /// Deactivates an assignment; existing invoices are untouched
    #[instrument(skip(self, ctx), fields(school_id = %ctx.school_id))]
    pub async fn revoke(
        &self,
        ctx: &TenantContext,
        assignment_id: AssignmentId,
    ) -> Result<StudentFeeAssignment, BillingError> {
        let mut uow = self.ledger.begin(ctx.school_id).await?;
        let mut assignment = uow
            .assignment(assignment_id)
            .await?
            .ok_or_else(|| BillingError::not_found("StudentFeeAssignment", assignment_id))?;

        uow.set_assignment_active(assignment_id, false).await?;
        uow.commit().await?;

        assignment.is_active = false;
        info!(%assignment_id, "Fee assignment revoked");
        Ok(assignment)
    }
}

fn build_structure(ctx: &TenantContext, request: CreateFeeStructureRequest) -> Result<FeeStructure, BillingError> {
    let scope = FeeScope::from_parts(request.academic_year_id, request.class_id, request.school_level_id)?;
    let currency = request.currency;

    let mut structure = if request.components.is_empty() {
        let amount = request
            .amount
            .ok_or_else(|| BillingError::validation("A flat fee structure requires an amount"))?;
        FeeStructure::flat(ctx.school_id, request.name, Money::new(amount, currency), request.frequency, scope)
    } else {
        let components = request
            .components
            .into_iter()
            .map(|c| FeeComponent {
                inventory_item_id: c.inventory_item_id,
                ..FeeComponent::new(c.name, Money::new(c.amount, currency))
            })
            .collect();
        let mut structure = FeeStructure::itemized(ctx.school_id, request.name, components, request.frequency, scope)?;
        if let Some(amount) = request.amount {
            structure.amount = Money::new(amount, currency);
        }
        structure
    };

    structure.description = request.description;
    Ok(structure)
}
