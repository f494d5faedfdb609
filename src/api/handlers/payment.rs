//! Payment handlers: record and list repayments.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{PaymentDto, PaymentListResponse, RecordPaymentRequest, RecordPaymentResponse};
use crate::app_state::AppState;
use crate::domain::{Actor, LoanRef};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /loans/{id}/payments` — Record a payment.
///
/// # Errors
///
/// Returns [`LedgerError`] when any payment precondition fails.
#[utoipa::path(
    post,
    path = "/api/v1/loans/{id}/payments",
    tag = "Payments",
    summary = "Record a payment",
    description = "Applies a payment to the loan balance. The balance is re-read under the loan's lock; a payment that reaches zero settles the loan.",
    request_body = RecordPaymentRequest,
    params(
        ("id" = String, Path, description = "Loan UUID or code"),
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 201, description = "Payment recorded", body = RecordPaymentResponse),
        (status = 400, description = "Invalid amount or paid_at", body = ErrorResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse),
        (status = 409, description = "Loan settled or cancelled, or conflict", body = ErrorResponse),
        (status = 422, description = "Amount exceeds outstanding balance", body = ErrorResponse),
    )
)]
pub async fn record_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan_ref: LoanRef = id.parse()?;
    let receipt = state
        .payment_service
        .record_payment(&actor, &loan_ref, req.into_draft(actor.id))
        .await?;
    Ok((StatusCode::CREATED, Json(RecordPaymentResponse::from(receipt))))
}

/// `GET /loans/{id}/payments` — Payment history of a loan.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] if the loan does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/loans/{id}/payments",
    tag = "Payments",
    summary = "List payments",
    description = "Returns the loan's payments ordered by paid_at, then code.",
    params(
        ("id" = String, Path, description = "Loan UUID or code"),
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 200, description = "Payment list", body = PaymentListResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse),
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan_ref: LoanRef = id.parse()?;
    let payments = state.loan_service.list_payments(&actor, &loan_ref).await?;
    Ok(Json(PaymentListResponse {
        data: payments.into_iter().map(PaymentDto::from).collect(),
    }))
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/loans/{id}/payments",
        get(list_payments).post(record_payment),
    )
}
