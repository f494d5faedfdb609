//! Domain events reflecting committed ledger mutations.
//!
//! Every successful mutation emits a [`LedgerEvent`] through the
//! [`super::EventBus`]. Events are broadcast to WebSocket subscribers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{LoanCode, LoanId, PaymentCode, WorkerId};

/// Domain event emitted after every committed mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Emitted when a loan is issued.
    LoanIssued {
        /// Loan primary key.
        loan_id: LoanId,
        /// Loan code.
        loan_code: LoanCode,
        /// Borrowing worker.
        worker_id: WorkerId,
        /// Amount lent.
        principal: Decimal,
        /// Issue time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a payment is recorded.
    PaymentRecorded {
        /// Loan primary key.
        loan_id: LoanId,
        /// Loan code.
        loan_code: LoanCode,
        /// Payment code.
        payment_code: PaymentCode,
        /// Amount applied.
        amount: Decimal,
        /// Balance before the payment.
        previous_balance: Decimal,
        /// Balance after the payment.
        new_balance: Decimal,
        /// Recording time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a payment brings the balance to zero.
    LoanSettled {
        /// Loan primary key.
        loan_id: LoanId,
        /// Loan code.
        loan_code: LoanCode,
        /// Settlement time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a loan is cancelled.
    LoanCancelled {
        /// Loan primary key.
        loan_id: LoanId,
        /// Loan code.
        loan_code: LoanCode,
        /// Balance left outstanding at cancellation.
        balance: Decimal,
        /// Cancellation time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when non-monetary loan details change.
    LoanUpdated {
        /// Loan primary key.
        loan_id: LoanId,
        /// Loan code.
        loan_code: LoanCode,
        /// Update time.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Returns the loan ID associated with this event.
    #[must_use]
    pub fn loan_id(&self) -> LoanId {
        match self {
            Self::LoanIssued { loan_id, .. }
            | Self::PaymentRecorded { loan_id, .. }
            | Self::LoanSettled { loan_id, .. }
            | Self::LoanCancelled { loan_id, .. }
            | Self::LoanUpdated { loan_id, .. } => *loan_id,
        }
    }

    /// Returns the code of the loan this event concerns.
    #[must_use]
    pub fn loan_code(&self) -> &LoanCode {
        match self {
            Self::LoanIssued { loan_code, .. }
            | Self::PaymentRecorded { loan_code, .. }
            | Self::LoanSettled { loan_code, .. }
            | Self::LoanCancelled { loan_code, .. }
            | Self::LoanUpdated { loan_code, .. } => loan_code,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::LoanIssued { .. } => "loan_issued",
            Self::PaymentRecorded { .. } => "payment_recorded",
            Self::LoanSettled { .. } => "loan_settled",
            Self::LoanCancelled { .. } => "loan_cancelled",
            Self::LoanUpdated { .. } => "loan_updated",
        }
    }
}
