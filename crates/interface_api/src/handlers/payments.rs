//! Payment handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::{PaymentId, TenantContext};

use super::{today, validated};
use crate::auth::{permissions, require, Claims};
use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

/// Records a payment and allocates it
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<RecordPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentReceiptResponse>), ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    let today = today();
    let request = validated(payload)?.into_domain(today)?;

    let receipt = state.services.payments.record_payment(&ctx, request, today).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// Gets a payment with its allocations
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let detail = state
        .services
        .payments
        .get_payment(&ctx, PaymentId::from_uuid(id))
        .await?;
    Ok(Json(detail.into()))
}
