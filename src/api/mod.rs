//! REST API layer: route handlers, DTOs, extractors and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`; `/health` sits at
//! the root. The OpenAPI document is assembled from the handlers'
//! `#[utoipa::path]` annotations.

pub mod dto;
pub mod extract;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::domain::{LoanStatus, PaymentMethod};
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI document for the ledger API.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Worker Loan Ledger",
        description = "Loan issuance, repayment recording and auditable balances."
    ),
    paths(
        handlers::loan::issue_loan,
        handlers::loan::list_loans,
        handlers::loan::get_loan,
        handlers::loan::update_loan,
        handlers::loan::cancel_loan,
        handlers::payment::record_payment,
        handlers::payment::list_payments,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::IssueLoanRequest,
        dto::UpdateLoanRequest,
        dto::LoanDto,
        dto::LoanDetailResponse,
        dto::LoanListResponse,
        dto::PaginationMeta,
        dto::RecordPaymentRequest,
        dto::RecordPaymentResponse,
        dto::PaymentDto,
        dto::PaymentListResponse,
        handlers::system::HealthResponse,
        LoanStatus,
        PaymentMethod,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Loans", description = "Loan lifecycle"),
        (name = "Payments", description = "Repayments"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/loans",
            "/api/v1/loans/{id}",
            "/api/v1/loans/{id}/cancel",
            "/api/v1/loans/{id}/payments",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
