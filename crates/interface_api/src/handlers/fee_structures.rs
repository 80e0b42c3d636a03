//! Fee structure handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::{AssignmentId, FeeStructureId, StudentId, TenantContext};
use domain_billing as billing;

use super::validated;
use crate::auth::{permissions, require, Claims};
use crate::dto::fee_structures::*;
use crate::{error::ApiError, AppState};

/// Creates a fee structure
pub async fn create_fee_structure(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateFeeStructureRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FeeStructureResponse>), ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let request = validated(payload)?.into_domain()?;

    let structure = state.services.fee_setup.create_fee_structure(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(structure.into())))
}

/// Gets a fee structure with its components
pub async fn get_fee_structure(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeeStructureResponse>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let structure = state
        .services
        .fee_setup
        .get_fee_structure(&ctx, FeeStructureId::from_uuid(id))
        .await?;
    Ok(Json(structure.into()))
}

/// Assigns a fee structure to a student
pub async fn assign_student(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<AssignFeeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let Json(body) = payload?;

    let assignment = state
        .services
        .fee_setup
        .assign(
            &ctx,
            billing::AssignFeeRequest {
                student_id: StudentId::from_uuid(body.student_id),
                fee_structure_id: FeeStructureId::from_uuid(id),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(assignment.into())))
}

/// Deactivates an assignment
pub async fn revoke_assignment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let assignment = state
        .services
        .fee_setup
        .revoke(&ctx, AssignmentId::from_uuid(id))
        .await?;
    Ok(Json(assignment.into()))
}

/// Bulk-generates invoices for a structure's assigned students
pub async fn generate_invoices(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<GenerateInvoicesRequest>, JsonRejection>,
) -> Result<Json<GenerationReportResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let Json(body) = payload?;

    let report = state
        .services
        .invoices
        .generate_invoices(&ctx, body.into_domain(id))
        .await?;
    Ok(Json(report.into()))
}
