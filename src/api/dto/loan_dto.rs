//! Loan DTOs for issue, update, get and list operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common_dto::{PaginationMeta, PaginationParams, default_page, default_per_page, double_option};
use super::payment_dto::PaymentDto;
use crate::domain::{Loan, LoanDetailsUpdate, LoanFilter, LoanStatus, NewLoan, WorkerId};
use crate::error::LedgerError;
use crate::service::LoanSummary;

/// Request body for `POST /loans`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueLoanRequest {
    /// Borrowing worker.
    pub worker_id: Uuid,
    /// Amount lent, positive with at most two decimals.
    #[schema(value_type = String, example = "5000.00")]
    pub principal: Decimal,
    /// Informational interest rate in percent. Defaults to 0.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "0")]
    pub interest_rate: Option<Decimal>,
    /// Free-text purpose.
    #[serde(default)]
    pub purpose: Option<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl From<IssueLoanRequest> for NewLoan {
    fn from(req: IssueLoanRequest) -> Self {
        Self {
            worker_id: WorkerId::from_uuid(req.worker_id),
            principal: req.principal,
            interest_rate: req.interest_rate.unwrap_or(Decimal::ZERO),
            purpose: trimmed(req.purpose),
            notes: trimmed(req.notes),
            due_date: req.due_date,
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Request body for `PATCH /loans/{id}`.
///
/// Omitted fields are left unchanged. An empty string clears `purpose` or
/// `notes`; `"due_date": null` clears the due date.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateLoanRequest {
    /// New purpose.
    #[serde(default)]
    pub purpose: Option<String>,
    /// New notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// New due date, or `null` to clear it.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// New interest rate.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub interest_rate: Option<Decimal>,
}

impl From<UpdateLoanRequest> for LoanDetailsUpdate {
    fn from(req: UpdateLoanRequest) -> Self {
        Self {
            purpose: req.purpose,
            notes: req.notes,
            due_date: req.due_date,
            interest_rate: req.interest_rate,
        }
    }
}

/// Query parameters for `GET /loans`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanListQuery {
    /// Only loans of this worker.
    pub worker_id: Option<Uuid>,
    /// Effective status: `ACTIVE`, `OVERDUE`, `PAID_OFF` or `CANCELLED`.
    pub status: Option<String>,
    /// Case-insensitive match on loan code or worker name.
    pub search: Option<String>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl LoanListQuery {
    /// Converts the query into a service filter.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] for an unknown status.
    pub fn filter(&self) -> Result<LoanFilter, LedgerError> {
        Ok(LoanFilter {
            worker_id: self.worker_id.map(WorkerId::from_uuid),
            status: self
                .status
                .as_deref()
                .map(str::parse::<LoanStatus>)
                .transpose()?,
            search: self.search.clone(),
        })
    }

    /// Pagination part of the query.
    #[must_use]
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Loan as returned by the API, with its effective status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanDto {
    /// Opaque id.
    pub id: Uuid,
    /// Human-readable code, `L-YYYYMM-NNNN`.
    pub loan_code: String,
    /// Borrowing worker.
    pub worker_id: Uuid,
    /// Amount lent.
    #[schema(value_type = String)]
    pub principal: Decimal,
    /// Outstanding balance.
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// Repaid so far.
    #[schema(value_type = String)]
    pub amount_paid: Decimal,
    /// Informational interest rate in percent.
    #[schema(value_type = String)]
    pub interest_rate: Decimal,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Effective status.
    pub status: LoanStatus,
    /// Disbursement time.
    pub disbursed_at: DateTime<Utc>,
    /// Due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Issuing user.
    pub created_by_id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl From<Loan> for LoanDto {
    fn from(loan: Loan) -> Self {
        Self {
            id: loan.id.into(),
            amount_paid: loan.amount_paid(),
            loan_code: loan.code.into(),
            worker_id: loan.worker_id.into(),
            principal: loan.principal,
            balance: loan.balance,
            interest_rate: loan.interest_rate,
            purpose: loan.purpose,
            notes: loan.notes,
            status: loan.status,
            disbursed_at: loan.disbursed_at,
            due_date: loan.due_date,
            created_by_id: loan.created_by_id.into(),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
        }
    }
}

/// Response body for `GET /loans/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoanDetailResponse {
    /// The loan.
    pub loan: LoanDto,
    /// Payments ordered by `paid_at`.
    pub payments: Vec<PaymentDto>,
    /// Sum of all payments.
    #[schema(value_type = String)]
    pub total_paid: Decimal,
}

impl From<LoanSummary> for LoanDetailResponse {
    fn from(summary: LoanSummary) -> Self {
        Self {
            loan: summary.loan.into(),
            payments: summary.payments.into_iter().map(PaymentDto::from).collect(),
            total_paid: summary.total_paid,
        }
    }
}

/// Paginated list response for `GET /loans`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoanListResponse {
    /// Loans on this page, newest first.
    pub data: Vec<LoanDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn issue_request_accepts_string_or_number_amounts() {
        let worker = Uuid::new_v4();
        let json = format!(r#"{{"worker_id": "{worker}", "principal": "1500.50"}}"#);
        let Ok(req) = serde_json::from_str::<IssueLoanRequest>(&json) else {
            panic!("valid request");
        };
        assert_eq!(req.principal, dec!(1500.50));

        let json = format!(r#"{{"worker_id": "{worker}", "principal": 200, "purpose": "  "}}"#);
        let Ok(req) = serde_json::from_str::<IssueLoanRequest>(&json) else {
            panic!("valid request");
        };
        let new = NewLoan::from(req);
        assert_eq!(new.principal, dec!(200));
        assert_eq!(new.interest_rate, dec!(0));
        assert_eq!(new.purpose, None);
    }

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let Ok(absent) = serde_json::from_str::<UpdateLoanRequest>(r#"{"notes": "x"}"#) else {
            panic!("valid request");
        };
        assert_eq!(absent.due_date, None);

        let Ok(cleared) = serde_json::from_str::<UpdateLoanRequest>(r#"{"due_date": null}"#)
        else {
            panic!("valid request");
        };
        assert_eq!(cleared.due_date, Some(None));
        assert!(!LoanDetailsUpdate::from(cleared).is_empty());
    }

    #[test]
    fn list_query_parses_status_case_insensitively() {
        let query = LoanListQuery {
            worker_id: None,
            status: Some("overdue".to_string()),
            search: None,
            page: 1,
            per_page: 20,
        };
        let Ok(filter) = query.filter() else {
            panic!("valid status");
        };
        assert_eq!(filter.status, Some(LoanStatus::Overdue));

        let bad = LoanListQuery {
            status: Some("late".to_string()),
            ..query
        };
        assert!(bad.filter().is_err());
    }
}
