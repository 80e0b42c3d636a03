//! HTTP API Layer
//!
//! This crate provides the REST API for the school billing ledger using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: One module per ledger area (fee structures, invoices,
//!   payments, reports)
//! - **Middleware**: JWT tenant authentication and audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `BillingError` mapped onto HTTP status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let ledger = Arc::new(PostgresLedger::new(pool));
//! let app = create_router(ledger, config)?;
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use std::sync::Arc;

use axum::{
    Router,
    http::HeaderName,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{Currency, MoneyError};
use domain_billing::{LedgerPort, LedgerServices};

use crate::config::ApiConfig;
use crate::handlers::{fee_structures, health, invoices, payments, reports};
use crate::middleware::{audit_middleware, auth_middleware, REQUEST_ID_HEADER};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerPort>,
    pub services: LedgerServices,
    pub config: ApiConfig,
    /// Parsed from `config.currency`
    pub currency: Currency,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerPort>, config: ApiConfig) -> Result<Self, MoneyError> {
        let currency = config.default_currency()?;
        Ok(Self {
            services: LedgerServices::new(ledger.clone()),
            ledger,
            config,
            currency,
        })
    }
}

/// Creates the main API router
///
/// # Errors
///
/// Fails when the configured default currency is not supported
pub fn create_router(ledger: Arc<dyn LedgerPort>, config: ApiConfig) -> Result<Router, MoneyError> {
    let state = AppState::new(ledger, config)?;

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let fee_structure_routes = Router::new()
        .route("/", post(fee_structures::create_fee_structure))
        .route("/:id", get(fee_structures::get_fee_structure))
        .route("/:id/assignments", post(fee_structures::assign_student))
        .route("/:id/generate-invoices", post(fee_structures::generate_invoices));

    let invoice_routes = Router::new()
        .route("/", post(invoices::create_invoice))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/items", post(invoices::add_item))
        .route(
            "/:id/items/:item_id",
            put(invoices::update_item).delete(invoices::delete_item),
        )
        .route("/:id/send", post(invoices::send_invoice))
        .route("/:id/void", post(invoices::void_invoice))
        .route("/:id/cancel", post(invoices::cancel_invoice));

    let payment_routes = Router::new()
        .route("/", post(payments::record_payment))
        .route("/:id", get(payments::get_payment));

    let report_routes = Router::new()
        .route("/aging", get(reports::aging_report))
        .route("/dashboard", get(reports::dashboard));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/fee-structures", fee_structure_routes)
        .route("/assignments/:id/revoke", post(fee_structures::revoke_assignment))
        .nest("/invoices", invoice_routes)
        .route("/students/:id/invoices", get(invoices::list_student_invoices))
        .nest("/payments", payment_routes)
        .nest("/reports", report_routes)
        .route("/maintenance/refresh-statuses", post(reports::refresh_statuses))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Combine all routes
    Ok(Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state))
}
