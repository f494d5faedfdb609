//! Loan handlers: issue, list, get, update, cancel.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    IssueLoanRequest, LoanDetailResponse, LoanDto, LoanListQuery, LoanListResponse,
    UpdateLoanRequest,
};
use crate::app_state::AppState;
use crate::domain::{Actor, LoanRef};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /loans` — Issue a loan to a worker.
///
/// # Errors
///
/// Returns [`LedgerError`] on invalid input, unknown worker or missing
/// capability.
#[utoipa::path(
    post,
    path = "/api/v1/loans",
    tag = "Loans",
    summary = "Issue a loan",
    description = "Creates a loan with its full principal outstanding and status ACTIVE. The loan code is allocated from the monthly sequence.",
    request_body = IssueLoanRequest,
    params(
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "ADMIN, FINANCE, STAFF or VIEWER"),
    ),
    responses(
        (status = 201, description = "Loan issued", body = LoanDto),
        (status = 400, description = "Invalid amount or request", body = ErrorResponse),
        (status = 403, description = "Actor may not issue loans", body = ErrorResponse),
        (status = 404, description = "Worker not found", body = ErrorResponse),
    )
)]
pub async fn issue_loan(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<IssueLoanRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan = state.loan_service.issue_loan(&actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(LoanDto::from(loan))))
}

/// `GET /loans` — List loans with filters and pagination.
///
/// # Errors
///
/// Returns [`LedgerError`] on an invalid filter or missing capability.
#[utoipa::path(
    get,
    path = "/api/v1/loans",
    tag = "Loans",
    summary = "List loans",
    description = "Returns loans newest first, filtered by worker, effective status and a free-text search over loan code and worker name.",
    params(
        LoanListQuery,
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 200, description = "Paginated loan list", body = LoanListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<LoanListQuery>,
) -> Result<impl IntoResponse, LedgerError> {
    let filter = query.filter()?;
    let loans = state.loan_service.list_loans(&actor, &filter).await?;
    let (page, pagination) = query.pagination().paginate(loans);

    Ok(Json(LoanListResponse {
        data: page.into_iter().map(LoanDto::from).collect(),
        pagination,
    }))
}

/// `GET /loans/{id}` — Loan details with payment history.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] if the loan does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/loans/{id}",
    tag = "Loans",
    summary = "Get loan details",
    description = "Returns the loan with its effective status, its payments and the total repaid.",
    params(
        ("id" = String, Path, description = "Loan UUID or code (L-YYYYMM-NNNN)"),
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetailResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse),
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan_ref: LoanRef = id.parse()?;
    let summary = state.loan_service.loan_summary(&actor, &loan_ref).await?;
    Ok(Json(LoanDetailResponse::from(summary)))
}

/// `PATCH /loans/{id}` — Edit non-monetary loan details.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] for a settled or cancelled
/// loan.
#[utoipa::path(
    patch,
    path = "/api/v1/loans/{id}",
    tag = "Loans",
    summary = "Update loan details",
    description = "Edits purpose, notes, due date or interest rate. Balance and status are never touched.",
    request_body = UpdateLoanRequest,
    params(
        ("id" = String, Path, description = "Loan UUID or code"),
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 200, description = "Updated loan", body = LoanDto),
        (status = 400, description = "Empty or invalid update", body = ErrorResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse),
        (status = 409, description = "Loan is settled or cancelled", body = ErrorResponse),
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<UpdateLoanRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan_ref: LoanRef = id.parse()?;
    let loan = state
        .loan_service
        .update_loan_details(&actor, &loan_ref, req.into())
        .await?;
    Ok(Json(LoanDto::from(loan)))
}

/// `POST /loans/{id}/cancel` — Cancel a live loan.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] if the loan is already
/// terminal.
#[utoipa::path(
    post,
    path = "/api/v1/loans/{id}/cancel",
    tag = "Loans",
    summary = "Cancel a loan",
    description = "Moves an ACTIVE or OVERDUE loan to CANCELLED. The outstanding balance is kept for the record.",
    params(
        ("id" = String, Path, description = "Loan UUID or code"),
        ("x-actor-id" = uuid::Uuid, Header, description = "Acting user"),
        ("x-actor-role" = String, Header, description = "Actor role"),
    ),
    responses(
        (status = 200, description = "Cancelled loan", body = LoanDto),
        (status = 403, description = "Actor may not cancel loans", body = ErrorResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse),
        (status = 409, description = "Loan is already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_loan(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let loan_ref: LoanRef = id.parse()?;
    let loan = state.loan_service.cancel_loan(&actor, &loan_ref).await?;
    Ok(Json(LoanDto::from(loan)))
}

/// Loan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/loans", post(issue_loan).get(list_loans))
        .route("/loans/{id}", get(get_loan).patch(update_loan))
        .route("/loans/{id}/cancel", post(cancel_loan))
}
