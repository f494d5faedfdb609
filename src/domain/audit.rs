//! Audit trail entries and the sink contract.
//!
//! The ledger writes one [`AuditEntry`] per committed mutation and never
//! reads the trail back. Entries are appended while the mutated loan is
//! still locked, so a mutation is never visible without its audit record.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Loan, LoanChange, PaymentReceipt, UserId};
use crate::error::LedgerError;

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Entity created.
    Create,
    /// Entity changed.
    Update,
    /// Entity removed, or cancelled in its history-preserving equivalent.
    Delete,
}

impl AuditAction {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// User who performed the action.
    pub actor_id: UserId,
    /// What kind of change.
    pub action: AuditAction,
    /// Entity type, `"Loan"` or `"Payment"`.
    pub entity: String,
    /// Human-readable id of the entity.
    pub entity_id: String,
    /// State before the change, if any.
    pub old_value: Option<serde_json::Value>,
    /// State after the change, if any.
    pub new_value: Option<serde_json::Value>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry for a newly issued loan.
    #[must_use]
    pub fn loan_issued(loan: &Loan, actor_id: UserId) -> Self {
        Self {
            actor_id,
            action: AuditAction::Create,
            entity: "Loan".to_string(),
            entity_id: loan.code.to_string(),
            old_value: None,
            new_value: serde_json::to_value(loan).ok(),
            timestamp: loan.created_at,
        }
    }

    /// Entry for a cancellation or a detail edit.
    ///
    /// Cancellation is recorded as `DELETE`, the only removal path a loan
    /// has; the old value holds the pre-cancellation state.
    #[must_use]
    pub fn loan_changed(change: &LoanChange, action: AuditAction, actor_id: UserId) -> Self {
        Self {
            actor_id,
            action,
            entity: "Loan".to_string(),
            entity_id: change.after.code.to_string(),
            old_value: serde_json::to_value(&change.before).ok(),
            new_value: serde_json::to_value(&change.after).ok(),
            timestamp: change.after.updated_at,
        }
    }

    /// Entry for a recorded payment, covering the loan balance change too.
    #[must_use]
    pub fn payment_recorded(receipt: &PaymentReceipt) -> Self {
        let payment = &receipt.payment;
        Self {
            actor_id: payment.recorded_by_id,
            action: AuditAction::Create,
            entity: "Payment".to_string(),
            entity_id: payment.code.to_string(),
            old_value: None,
            new_value: Some(serde_json::json!({
                "payment_id": payment.code,
                "amount": payment.amount,
                "method": payment.method,
                "paid_at": payment.paid_at,
                "loan_id": receipt.loan.code,
                "previous_balance": receipt.previous_balance,
                "new_balance": receipt.loan.balance,
                "loan_status": receipt.loan.status,
            })),
            timestamp: payment.created_at,
        }
    }
}

/// Append-only destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + fmt::Debug {
    /// Appends one entry. Returns once the entry is durably accepted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AuditDelivery`] if the sink refused or could
    /// not store the entry.
    async fn append(&self, entry: AuditEntry) -> Result<(), LedgerError>;
}
