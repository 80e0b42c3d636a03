//! Report and maintenance handlers

use axum::{
    extract::{Query, State},
    Extension, Json,
};

use core_kernel::{Currency, TenantContext};

use super::today;
use crate::auth::{permissions, require, Claims};
use crate::dto::parse_currency;
use crate::dto::reports::*;
use crate::{error::ApiError, AppState};

fn report_currency(state: &AppState, query: &ReportQuery) -> Result<Currency, ApiError> {
    match &query.currency {
        Some(code) => parse_currency(code),
        None => Ok(state.currency),
    }
}

/// Aging of open balances
pub async fn aging_report(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<AgingReportResponse>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let currency = report_currency(&state, &query)?;
    let as_of = query.as_of.unwrap_or_else(today);

    let report = state.services.reporting.aging_report(&ctx, currency, as_of).await?;
    Ok(Json(report.into()))
}

/// Headline billing figures
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<DashboardResponse>, ApiError> {
    require(&claims, permissions::BILLING_READ)?;
    let currency = report_currency(&state, &query)?;
    let as_of = query.as_of.unwrap_or_else(today);

    let stats = state.services.reporting.dashboard(&ctx, currency, as_of).await?;
    Ok(Json(stats.into()))
}

/// Marks past-due open invoices OVERDUE
pub async fn refresh_statuses(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<RefreshResponse>, ApiError> {
    require(&claims, permissions::BILLING_WRITE)?;
    let as_of = today();

    let updated = state.services.reporting.refresh_statuses(&ctx, as_of).await?;
    Ok(Json(RefreshResponse { as_of, updated }))
}
