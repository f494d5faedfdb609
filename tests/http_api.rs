//! HTTP surface tests driven through the full router with `tower::ServiceExt`.
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

use worker_loan_ledger::app_state::AppState;
use worker_loan_ledger::build_app;
use worker_loan_ledger::domain::{EventBus, UserId, WorkerId};
use worker_loan_ledger::persistence::memory::{MemoryWorkerDirectory, WorkerSeed};
use worker_loan_ledger::service::{LedgerContext, PaymentSettings};

struct TestApp {
    router: Router,
    worker: WorkerId,
    actor: UserId,
}

fn app() -> TestApp {
    let worker = WorkerId::new();
    let directory = MemoryWorkerDirectory::from_seeds([WorkerSeed {
        id: worker,
        name: "Ana Reyes".to_string(),
    }]);
    let ctx = LedgerContext::in_memory(Arc::new(directory), EventBus::new(64));
    let state = AppState::new(ctx, PaymentSettings::default());
    TestApp {
        router: build_app(state, Duration::from_secs(5)),
        worker,
        actor: UserId::new(),
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder
                .header("x-actor-id", self.actor.to_string())
                .header("x-actor-role", role);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let Ok(request) = builder.body(body) else {
            panic!("valid request");
        };
        let Ok(response) = self.router.clone().oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn issue(&self, principal: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/loans",
                Some("FINANCE"),
                Some(json!({ "worker_id": self.worker, "principal": principal })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

static NULL: Value = Value::Null;

fn at<'a>(value: &'a Value, path: &[&str]) -> &'a Value {
    path.iter().fold(value, |v, key| v.get(*key).unwrap_or(&NULL))
}

fn text<'a>(value: &'a Value, path: &[&str]) -> &'a str {
    at(value, path).as_str().unwrap_or_default()
}

fn decimal(value: &Value, path: &[&str]) -> Option<Decimal> {
    match at(value, path) {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

#[tokio::test]
async fn health_needs_no_actor() {
    let app = app();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&body, &["status"]), "healthy");
    assert_eq!(at(&body, &["event_subscribers"]), &json!(0));
}

#[tokio::test]
async fn missing_actor_headers_are_unauthorized() {
    let app = app();
    let (status, body) = app.send(Method::GET, "/api/v1/loans", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(at(&body, &["error", "code"]), &json!(4001));
}

#[tokio::test]
async fn issue_pay_and_read_back() {
    let app = app();
    let loan = app.issue("1000.00").await;
    let code = text(&loan, &["loan_code"]).to_string();
    assert!(code.starts_with("L-"));
    assert_eq!(text(&loan, &["status"]), "ACTIVE");
    assert_eq!(decimal(&loan, &["balance"]), Some(dec!(1000.00)));

    let (status, receipt) = app
        .send(
            Method::POST,
            &format!("/api/v1/loans/{code}/payments"),
            Some("STAFF"),
            Some(json!({ "amount": "400.00", "method": "CASH" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    assert_eq!(decimal(&receipt, &["previous_balance"]), Some(dec!(1000.00)));
    assert_eq!(decimal(&receipt, &["loan", "balance"]), Some(dec!(600.00)));
    assert_eq!(
        text(&receipt, &["payment", "recorded_by_id"]),
        app.actor.to_string()
    );

    let id = text(&loan, &["id"]).to_string();
    let (status, detail) = app
        .send(Method::GET, &format!("/api/v1/loans/{id}"), Some("VIEWER"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&detail, &["total_paid"]), Some(dec!(400.00)));
    assert_eq!(at(&detail, &["payments"]).as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn overpayment_is_unprocessable() {
    let app = app();
    let loan = app.issue("1000").await;
    let code = text(&loan, &["loan_code"]).to_string();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/loans/{code}/payments"),
            Some("FINANCE"),
            Some(json!({ "amount": "1500", "method": "BANK_TRANSFER" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(at(&body, &["error", "code"]), &json!(3004));
}

#[tokio::test]
async fn viewer_cannot_issue() {
    let app = app();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some("VIEWER"),
            Some(json!({ "worker_id": app.worker, "principal": "10" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(at(&body, &["error", "code"]), &json!(4003));
}

#[tokio::test]
async fn unknown_loan_and_worker_are_not_found() {
    let app = app();
    let (status, _) = app
        .send(Method::GET, "/api/v1/loans/L-202401-0042", Some("ADMIN"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some("ADMIN"),
            Some(json!({ "worker_id": WorkerId::new(), "principal": "10" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(at(&body, &["error", "code"]), &json!(2002));
}

#[tokio::test]
async fn cancel_then_pay_conflicts() {
    let app = app();
    let loan = app.issue("500").await;
    let id = text(&loan, &["id"]).to_string();

    let (status, cancelled) = app
        .send(Method::POST, &format!("/api/v1/loans/{id}/cancel"), Some("ADMIN"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&cancelled, &["status"]), "CANCELLED");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/loans/{id}/payments"),
            Some("FINANCE"),
            Some(json!({ "amount": "50", "method": "CASH" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(at(&body, &["error", "code"]), &json!(3002));
}

#[tokio::test]
async fn cancelled_loan_rejects_detail_updates() {
    let app = app();
    let loan = app.issue("500").await;
    let id = text(&loan, &["id"]).to_string();

    let (status, _) = app
        .send(Method::POST, &format!("/api/v1/loans/{id}/cancel"), Some("ADMIN"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/v1/loans/{id}"),
            Some("ADMIN"),
            Some(json!({ "purpose": "rewritten after cancel" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(at(&body, &["error", "code"]), &json!(3003));

    let (_, detail) = app
        .send(Method::GET, &format!("/api/v1/loans/{id}"), Some("VIEWER"), None)
        .await;
    assert_ne!(text(&detail, &["loan", "purpose"]), "rewritten after cancel");
}

#[tokio::test]
async fn event_stream_requires_actor() {
    let app = app();
    let (status, body) = app.send(Method::GET, "/ws", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(at(&body, &["error", "code"]), &json!(4001));

    // Identified but not upgrading: rejected by the upgrade extractor, not auth.
    let (status, _) = app.send(Method::GET, "/ws", Some("VIEWER"), None).await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(status, StatusCode::FORBIDDEN);
    assert!(status.is_client_error());
}

#[tokio::test]
async fn list_filters_by_status_and_paginates() {
    let app = app();
    for _ in 0..3 {
        app.issue("100").await;
    }
    let settled = app.issue("20").await;
    let code = text(&settled, &["loan_code"]).to_string();
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/loans/{code}/payments"),
            Some("FINANCE"),
            Some(json!({ "amount": "20", "method": "PAYROLL_DEDUCTION" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = app
        .send(
            Method::GET,
            "/api/v1/loans?status=active&per_page=2&page=2",
            Some("VIEWER"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(at(&page, &["pagination", "total"]), &json!(3));
    assert_eq!(at(&page, &["pagination", "total_pages"]), &json!(2));
    assert_eq!(at(&page, &["data"]).as_array().map(Vec::len), Some(1));

    let (status, paid) = app
        .send(Method::GET, "/api/v1/loans?status=PAID_OFF", Some("VIEWER"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        at(&paid, &["data"])
            .as_array()
            .and_then(|rows| rows.first())
            .map(|row| text(row, &["loan_code"]).to_string()),
        Some(code)
    );

    let (status, _) = app
        .send(Method::GET, "/api/v1/loans?status=late", Some("VIEWER"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
