//! Persistence layer: loan and payment storage plus collaborator backends.
//!
//! [`LedgerStore`] is the storage contract. Each mutating method performs
//! its read-check-write under the loan's exclusive lock (a per-loan mutex
//! in memory, `SELECT … FOR UPDATE` in PostgreSQL), records the audit
//! entry before releasing it, and leaves no partial state on failure.
//!
//! Two backends are provided: [`memory`] for tests and local runs, and
//! [`postgres`] using `sqlx::PgPool`.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AuditSink, Loan, LoanChange, LoanCode, LoanId, LoanMutation, Payment, PaymentDraft,
    PaymentReceipt, SequenceAllocator, UserId, WorkerId,
};
use crate::error::LedgerError;

/// Who is mutating, when, and where the audit entry goes.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    /// Acting user.
    pub actor: UserId,
    /// Timestamp applied to the mutation.
    pub now: DateTime<Utc>,
    /// Destination of the audit entry. A backend that keeps the audit trail
    /// in its own database writes the entry on the mutation's transaction
    /// instead.
    pub audit: &'a dyn AuditSink,
}

/// Storage contract for loans and payments.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Persists a newly issued loan and its `CREATE` audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] on a duplicate code, or a storage
    /// or audit error.
    async fn insert_loan(&self, loan: Loan, ctx: MutationContext<'_>) -> Result<Loan, LedgerError>;

    /// Loads a loan by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such loan exists.
    async fn get_loan(&self, loan_id: LoanId) -> Result<Loan, LedgerError>;

    /// Loads a loan by its human-readable code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no such loan exists.
    async fn find_loan_by_code(&self, code: &LoanCode) -> Result<Loan, LedgerError>;

    /// Lists loans, newest first, optionally for a single worker.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    async fn list_loans(&self, worker_id: Option<WorkerId>) -> Result<Vec<Loan>, LedgerError>;

    /// Lists payments of a loan ordered by `paid_at`, then code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the loan does not exist.
    async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>, LedgerError>;

    /// Cancels a loan or edits its details under the loan's lock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`], [`LedgerError::InvalidTransition`],
    /// a validation error from the mutation, or a storage or audit error.
    async fn mutate_loan(
        &self,
        loan_id: LoanId,
        mutation: &LoanMutation,
        ctx: MutationContext<'_>,
    ) -> Result<LoanChange, LedgerError>;

    /// Records a payment: re-reads the balance under the loan's lock,
    /// checks it, allocates the payment code, inserts the payment and
    /// updates balance and status as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`], [`LedgerError::AlreadySettled`],
    /// [`LedgerError::LoanCancelled`], [`LedgerError::OverPayment`],
    /// [`LedgerError::AllocationFailed`], [`LedgerError::ConcurrencyConflict`]
    /// or a storage or audit error.
    async fn record_payment(
        &self,
        loan_id: LoanId,
        draft: PaymentDraft,
        allocator: &dyn SequenceAllocator,
        ctx: MutationContext<'_>,
    ) -> Result<PaymentReceipt, LedgerError>;
}
