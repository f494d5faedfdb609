//! Payment DTOs for recording and listing repayments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::loan_dto::LoanDto;
use crate::domain::{Payment, PaymentDraft, PaymentMethod, PaymentReceipt, UserId};

/// Request body for `POST /loans/{id}/payments`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    /// Amount to apply, positive with at most two decimals.
    #[schema(value_type = String, example = "250.00")]
    pub amount: Decimal,
    /// How the money was received.
    pub method: PaymentMethod,
    /// External reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// When the worker paid. Defaults to now; may be in the past.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl RecordPaymentRequest {
    /// Builds a draft attributed to `recorder`.
    #[must_use]
    pub fn into_draft(self, recorder: UserId) -> PaymentDraft {
        PaymentDraft {
            amount: self.amount,
            method: self.method,
            reference: self.reference.filter(|r| !r.trim().is_empty()),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            paid_at: self.paid_at,
            recorded_by_id: recorder,
        }
    }
}

/// Payment as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentDto {
    /// Opaque id.
    pub id: Uuid,
    /// Human-readable code, `P-YYYYMMDD-NNNN`.
    pub payment_code: String,
    /// Owning loan.
    pub loan_id: Uuid,
    /// Amount applied.
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// How it was paid.
    pub method: PaymentMethod,
    /// External reference.
    pub reference: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// When the worker paid.
    pub paid_at: DateTime<Utc>,
    /// Recording user.
    pub recorded_by_id: Uuid,
    /// Recording time.
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentDto {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.into(),
            payment_code: payment.code.into(),
            loan_id: payment.loan_id.into(),
            amount: payment.amount,
            method: payment.method,
            reference: payment.reference,
            notes: payment.notes,
            paid_at: payment.paid_at,
            recorded_by_id: payment.recorded_by_id.into(),
            created_at: payment.created_at,
        }
    }
}

/// Response body for `POST /loans/{id}/payments` (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct RecordPaymentResponse {
    /// The new payment.
    pub payment: PaymentDto,
    /// Loan after the payment.
    pub loan: LoanDto,
    /// Balance before the payment.
    #[schema(value_type = String)]
    pub previous_balance: Decimal,
}

impl From<PaymentReceipt> for RecordPaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            payment: receipt.payment.into(),
            loan: receipt.loan.into(),
            previous_balance: receipt.previous_balance,
        }
    }
}

/// Response body for `GET /loans/{id}/payments`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentListResponse {
    /// Payments ordered by `paid_at`, then code.
    pub data: Vec<PaymentDto>,
}
