//! # worker-loan-ledger
//!
//! Loan ledger for an HR back office: issues loans to workers, records
//! repayments against them and keeps balances, statuses and an audit
//! trail consistent under concurrent use.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── LoanService, PaymentService (service/)
//!     ├── AccessPolicy, EventBus (domain/)
//!     │
//!     ├── LedgerStore + SequenceAllocator + AuditSink (persistence/)
//!     │
//!     └── In-memory or PostgreSQL backends
//! ```
//!
//! Every mutation of a loan runs under that loan's exclusive lock: the
//! balance is re-read, checked, written and audited as one unit, so no
//! interleaving of requests can drive a balance below zero.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the full application: REST routes, `/ws`, and the HTTP layers.
pub fn build_app(state: AppState, request_timeout: std::time::Duration) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
