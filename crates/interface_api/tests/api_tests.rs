//! HTTP tests for the ledger API against the in-memory ledger

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use core_kernel::{SchoolId, StudentId, UserId};
use domain_billing::memory::InMemoryLedger;
use domain_billing::InventoryStock;
use interface_api::auth::create_token;
use interface_api::config::{ApiConfig, StorageBackend};
use interface_api::create_router;
use test_utils::SchoolFixture;

const SECRET: &str = "api-test-secret";

struct TestApp {
    router: Router,
    ledger: Arc<InMemoryLedger>,
    school: SchoolFixture,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        Self::with_roles(vec!["admin".to_string()])
    }

    fn with_roles(roles: Vec<String>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            storage: StorageBackend::Memory,
            ..ApiConfig::default()
        };
        let router = create_router(ledger.clone(), config).unwrap();
        let school = SchoolFixture::new();
        let token = create_token(school.ctx.actor_id, school.school_id(), roles, SECRET, 300).unwrap();
        Self {
            router,
            ledger,
            school,
            token,
        }
    }

    fn token_for_other_school(&self) -> String {
        create_token(UserId::new(), SchoolId::new(), vec!["admin".into()], SECRET, 300).unwrap()
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(&self.token, method, uri, body).await
    }

    async fn call_as(&self, token: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        send(&self.router, request).await
    }

    async fn create_invoice(&self, student: StudentId, items: Value) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "student_id": student.as_uuid(),
                    "currency": "KES",
                    "issue_date": "2026-01-05",
                    "due_date": "2099-02-05",
                    "items": items,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn amount(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64())
        .unwrap_or_else(|| panic!("not an amount: {}", value))
}

// ============================================================================
// Health and authentication
// ============================================================================

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let app = TestApp::new();
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_ledger() {
        let app = TestApp::new();
        let request = Request::get("/health/ready").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ledger"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = TestApp::new();
        let request = Request::get("/api/v1/reports/dashboard").body(Body::empty()).unwrap();
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let app = TestApp::new();
        let (status, _) = app
            .call_as("not-a-jwt", Method::GET, "/api/v1/reports/dashboard", None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_read_only_role_cannot_write() {
        let app = TestApp::with_roles(vec!["billing:read".to_string()]);
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "student_id": StudentId::new().as_uuid(),
                    "currency": "KES",
                    "issue_date": "2026-01-05",
                    "due_date": "2026-02-05",
                    "items": [{"description": "Tuition", "quantity": 1, "unit_price": "1200"}],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }
}

// ============================================================================
// Invoices
// ============================================================================

mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_invoice() {
        let app = TestApp::new();
        let created = app
            .create_invoice(
                StudentId::new(),
                json!([
                    {"description": "Tuition", "quantity": 1, "unit_price": "1200"},
                    {"description": "Activity", "quantity": 1, "unit_price": "300"},
                ]),
            )
            .await;

        assert_eq!(created["invoice_number"], "INV-2026-000001");
        assert_eq!(created["status"], "DRAFT");
        assert_eq!(amount(&created["total_amount"]), 1500.0);
        assert_eq!(created["items"].as_array().unwrap().len(), 2);

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = app.call(Method::GET, &format!("/api/v1/invoices/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["invoice_number"], "INV-2026-000001");
    }

    #[tokio::test]
    async fn test_invoice_without_items_is_unprocessable() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "student_id": StudentId::new().as_uuid(),
                    "currency": "KES",
                    "issue_date": "2026-01-05",
                    "due_date": "2026-02-05",
                    "items": [],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let app = TestApp::new();
        let (status, body) = app
            .call(Method::GET, &format!("/api/v1/invoices/{}", uuid::Uuid::new_v4()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_other_school_cannot_read_invoice() {
        let app = TestApp::new();
        let created = app
            .create_invoice(
                StudentId::new(),
                json!([{"description": "Tuition", "quantity": 1, "unit_price": "1200"}]),
            )
            .await;
        let uri = format!("/api/v1/invoices/{}", created["id"].as_str().unwrap());

        let other = app.token_for_other_school();
        let (status, _) = app.call_as(&other, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stock_shortage_is_conflict() {
        let app = TestApp::new();
        let stock = InventoryStock::new(app.school.school_id(), "Sweater", 3);
        let stock_id = stock.id;
        app.ledger.seed_stock(stock).await;

        let created = app
            .create_invoice(
                StudentId::new(),
                json!([{"description": "Sweater", "quantity": 1, "unit_price": "900",
                        "inventory_item_id": stock_id.as_uuid()}]),
            )
            .await;
        let item_id = created["items"][0]["id"].as_str().unwrap().to_string();
        let invoice_id = created["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/v1/invoices/{}/items/{}", invoice_id, item_id),
                Some(json!({"quantity": 5})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "insufficient_stock");
        assert_eq!(app.ledger.stock_level(stock_id).await, Some(2));

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/v1/invoices/{}/items/{}", invoice_id, item_id),
                Some(json!({"quantity": 3})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(amount(&body["total_amount"]), 2700.0);
        assert_eq!(app.ledger.stock_level(stock_id).await, Some(0));
    }

    #[tokio::test]
    async fn test_void_then_add_item_is_locked() {
        let app = TestApp::new();
        let created = app
            .create_invoice(
                StudentId::new(),
                json!([{"description": "Tuition", "quantity": 1, "unit_price": "1200"}]),
            )
            .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = app.call(Method::POST, &format!("/api/v1/invoices/{}/void", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "VOID");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/v1/invoices/{}/items", id),
                Some(json!({"description": "Late fee", "quantity": 1, "unit_price": "100"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invoice_locked");
    }
}

// ============================================================================
// Fee structures and generation
// ============================================================================

mod generation_tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_invoices_for_assigned_student() {
        let app = TestApp::new();
        let student = StudentId::new();
        app.ledger.seed_student_context(app.school.enrollment(student)).await;

        let (status, structure) = app
            .call(
                Method::POST,
                "/api/v1/fee-structures",
                Some(json!({
                    "name": "Term 1 Fees",
                    "currency": "KES",
                    "components": [
                        {"name": "Tuition", "amount": "1200"},
                        {"name": "Activity", "amount": "300"},
                    ],
                    "frequency": "termly",
                    "academic_year_id": app.school.academic_year_id.as_uuid(),
                    "class_id": app.school.class_id.as_uuid(),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", structure);
        assert_eq!(amount(&structure["amount"]), 1500.0);
        let structure_id = structure["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/v1/fee-structures/{}/assignments", structure_id),
                Some(json!({"student_id": student.as_uuid()})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let generate = json!({
            "academic_year_id": app.school.academic_year_id.as_uuid(),
            "issue_date": "2026-01-05",
            "due_date": "2026-02-05",
            "dry_run": true,
        });
        let uri = format!("/api/v1/fee-structures/{}/generate-invoices", structure_id);

        let (status, preview) = app.call(Method::POST, &uri, Some(generate.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["dry_run"], true);
        assert_eq!(preview["created"], 1);

        let mut commit = generate;
        commit["dry_run"] = json!(false);
        let (status, report) = app.call(Method::POST, &uri, Some(commit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["created"], 1);
        assert_eq!(amount(&report["total_amount"]), 1500.0);

        let (status, invoices) = app
            .call(
                Method::GET,
                &format!("/api/v1/students/{}/invoices", student.as_uuid()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(invoices.as_array().unwrap().len(), 1);
        assert_eq!(invoices[0]["invoice_number"], "INV-2026-000001");
    }

    #[tokio::test]
    async fn test_amount_must_match_component_sum() {
        let app = TestApp::new();
        let body = |amount: &str| {
            json!({
                "name": "Term 1 Fees",
                "currency": "KES",
                "amount": amount,
                "components": [
                    {"name": "Tuition", "amount": "1200"},
                    {"name": "Activity", "amount": "300"},
                ],
                "frequency": "termly",
                "academic_year_id": app.school.academic_year_id.as_uuid(),
                "class_id": app.school.class_id.as_uuid(),
            })
        };

        let (status, _) = app.call(Method::POST, "/api/v1/fee-structures", Some(body("1000"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, structure) = app.call(Method::POST, "/api/v1/fee-structures", Some(body("1500"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(amount(&structure["amount"]), 1500.0);
    }

    #[tokio::test]
    async fn test_unknown_frequency_is_unprocessable() {
        let app = TestApp::new();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/fee-structures",
                Some(json!({
                    "name": "Bus",
                    "currency": "KES",
                    "amount": "5000",
                    "frequency": "fortnightly",
                    "academic_year_id": app.school.academic_year_id.as_uuid(),
                    "class_id": app.school.class_id.as_uuid(),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

// ============================================================================
// Payments and reports
// ============================================================================

mod payment_tests {
    use super::*;

    #[tokio::test]
    async fn test_student_wide_payment_updates_invoice() {
        let app = TestApp::new();
        let student = StudentId::new();
        let created = app
            .create_invoice(
                student,
                json!([{"description": "Tuition", "quantity": 1, "unit_price": "1500"}]),
            )
            .await;

        let (status, receipt) = app
            .call(
                Method::POST,
                "/api/v1/payments",
                Some(json!({
                    "student_id": student.as_uuid(),
                    "amount": "1000",
                    "currency": "KES",
                    "method": "mobile_money",
                    "reference": "MPESA-QX12",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", receipt);
        assert_eq!(receipt["allocations"], 1);
        assert_eq!(amount(&receipt["allocated"]), 1000.0);

        let (_, invoice) = app
            .call(
                Method::GET,
                &format!("/api/v1/invoices/{}", created["id"].as_str().unwrap()),
                None,
            )
            .await;
        assert_eq!(invoice["status"], "PARTIALLY_PAID");
        assert_eq!(amount(&invoice["outstanding"]), 500.0);

        let (status, payment) = app
            .call(
                Method::GET,
                &format!("/api/v1/payments/{}", receipt["payment_id"].as_str().unwrap()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payment["method"], "mobile_money");
        assert_eq!(payment["allocations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_with_both_targets_is_unprocessable() {
        let app = TestApp::new();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/payments",
                Some(json!({
                    "student_id": StudentId::new().as_uuid(),
                    "invoice_id": uuid::Uuid::new_v4(),
                    "amount": "100",
                    "currency": "KES",
                    "method": "cash",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_dashboard_defaults_to_configured_currency() {
        let app = TestApp::new();
        let student = StudentId::new();
        let created = app
            .create_invoice(
                student,
                json!([{"description": "Tuition", "quantity": 1, "unit_price": "1200"}]),
            )
            .await;
        app.call(
            Method::POST,
            "/api/v1/payments",
            Some(json!({
                "invoice_id": created["id"],
                "amount": "1200",
                "currency": "KES",
                "method": "cash",
            })),
        )
        .await;

        let (status, stats) = app.call(Method::GET, "/api/v1/reports/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["currency"], "KES");
        assert_eq!(amount(&stats["total_billed"]), 1200.0);
        assert_eq!(amount(&stats["total_collected"]), 1200.0);
        assert_eq!(stats["invoices_by_status"]["PAID"], 1);
    }

    #[tokio::test]
    async fn test_aging_report_and_refresh() {
        let app = TestApp::new();
        let (status, aging) = app
            .call(Method::GET, "/api/v1/reports/aging?currency=KES&as_of=2026-06-01", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(aging["as_of"], "2026-06-01");
        assert_eq!(aging["buckets"].as_array().unwrap().len(), 4);

        let (status, refreshed) = app
            .call(Method::POST, "/api/v1/maintenance/refresh-statuses", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(refreshed["updated"], 0);
    }
}
