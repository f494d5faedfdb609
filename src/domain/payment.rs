//! Payment records applied against a loan's balance.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Loan, LoanId, PaymentCode, PaymentId, UserId};
use crate::error::LedgerError;

/// How the money was received. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash in hand.
    Cash,
    /// Bank transfer.
    BankTransfer,
    /// Deducted from the worker's payroll.
    PayrollDeduction,
    /// Paper check.
    Check,
}

impl PaymentMethod {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::PayrollDeduction => "PAYROLL_DEDUCTION",
            Self::Check => "CHECK",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CASH" => Ok(Self::Cash),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            "PAYROLL_DEDUCTION" => Ok(Self::PayrollDeduction),
            "CHECK" => Ok(Self::Check),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// An immutable record of funds applied to a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Opaque primary key.
    pub id: PaymentId,
    /// Human-readable code, `P-YYYYMMDD-NNNN`.
    pub code: PaymentCode,
    /// Owning loan.
    pub loan_id: LoanId,
    /// Amount applied, always > 0.
    pub amount: Decimal,
    /// How it was paid.
    pub method: PaymentMethod,
    /// External reference (receipt number, transfer id).
    pub reference: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// When the worker paid. May be earlier than `created_at`.
    pub paid_at: DateTime<Utc>,
    /// Recording user.
    pub recorded_by_id: UserId,
    /// When the payment was recorded.
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new payment.
#[derive(Debug, Clone)]
pub struct PaymentDraft {
    /// Amount to apply.
    pub amount: Decimal,
    /// How it was paid.
    pub method: PaymentMethod,
    /// External reference.
    pub reference: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Payment time; recording time when absent.
    pub paid_at: Option<DateTime<Utc>>,
    /// Recording user.
    pub recorded_by_id: UserId,
}

impl PaymentDraft {
    /// Turns the draft into a payment with its allocated code.
    #[must_use]
    pub fn into_payment(self, loan_id: LoanId, code: PaymentCode, now: DateTime<Utc>) -> Payment {
        Payment {
            id: PaymentId::new(),
            code,
            loan_id,
            amount: self.amount,
            method: self.method,
            reference: self.reference,
            notes: self.notes,
            paid_at: self.paid_at.unwrap_or(now),
            recorded_by_id: self.recorded_by_id,
            created_at: now,
        }
    }
}

/// Outcome of a recorded payment.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    /// The new payment.
    pub payment: Payment,
    /// Loan state after the payment.
    pub loan: Loan,
    /// Balance before the payment.
    pub previous_balance: Decimal,
}

impl PaymentReceipt {
    /// Returns `true` if this payment brought the balance to zero.
    #[must_use]
    pub fn settled(&self) -> bool {
        self.loan.balance.is_zero() && !self.previous_balance.is_zero()
    }
}
