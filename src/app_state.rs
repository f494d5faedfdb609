//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::{LedgerContext, LoanService, PaymentService, PaymentSettings};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loan lifecycle and read operations.
    pub loan_service: Arc<LoanService>,
    /// Payment recording.
    pub payment_service: Arc<PaymentService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds both services over one set of collaborators.
    #[must_use]
    pub fn new(ctx: LedgerContext, payment_settings: PaymentSettings) -> Self {
        let event_bus = ctx.event_bus.clone();
        Self {
            loan_service: Arc::new(LoanService::new(ctx.clone())),
            payment_service: Arc::new(PaymentService::new(ctx, payment_settings)),
            event_bus,
        }
    }
}
