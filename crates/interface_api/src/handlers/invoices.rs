//! Invoice handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::{InvoiceId, InvoiceItemId, StudentId, TenantContext};

use super::{today, validated};
use crate::auth::{permissions, require, Claims};
use crate::dto::invoices::*;
use crate::{error::ApiError, AppState};

/// Creates an ad-hoc invoice
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InvoiceDetailResponse>), ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let request = validated(payload)?.into_domain()?;

    let detail = state.services.invoices.create_invoice(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

/// Gets an invoice with its items and allocations
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let detail = state
        .services
        .invoices
        .get_invoice(&ctx, InvoiceId::from_uuid(id))
        .await?;
    Ok(Json(detail.into()))
}

/// Lists a student's invoices, newest first
pub async fn list_student_invoices(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<InvoiceResponse>>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let invoices = state
        .services
        .invoices
        .list_student_invoices(&ctx, StudentId::from_uuid(student_id))
        .await?;
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

/// Adds an item to an open invoice
pub async fn add_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<InvoiceItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InvoiceDetailResponse>), ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let item = validated(payload)?;

    let detail = state
        .services
        .invoices
        .add_item(&ctx, InvoiceId::from_uuid(id), item.into(), today())
        .await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

/// Edits an item, reconciling stock
pub async fn update_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<InvoiceDetailResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let patch = validated(payload)?.into_patch()?;

    let detail = state
        .services
        .invoices
        .update_item(
            &ctx,
            InvoiceId::from_uuid(id),
            InvoiceItemId::from_uuid(item_id),
            patch,
            today(),
        )
        .await?;
    Ok(Json(detail.into()))
}

/// Removes an item, returning its stock
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InvoiceDetailResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let detail = state
        .services
        .invoices
        .delete_item(
            &ctx,
            InvoiceId::from_uuid(id),
            InvoiceItemId::from_uuid(item_id),
            today(),
        )
        .await?;
    Ok(Json(detail.into()))
}

/// DRAFT → SENT
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let invoice = state.services.invoices.send(&ctx, InvoiceId::from_uuid(id)).await?;
    Ok(Json(invoice.into()))
}

pub async fn void_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let invoice = state.services.invoices.void(&ctx, InvoiceId::from_uuid(id)).await?;
    Ok(Json(invoice.into()))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let invoice = state.services.invoices.cancel(&ctx, InvoiceId::from_uuid(id)).await?;
    Ok(Json(invoice.into()))
}
