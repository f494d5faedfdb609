//! Payment service: applies repayments to loan balances.

use std::time::Duration;

use chrono::Utc;

use super::LedgerContext;
use crate::domain::policy::require;
use crate::domain::{Actor, LedgerEvent, LoanRef, PaymentDraft, PaymentReceipt, validate_amount};
use crate::error::LedgerError;
use crate::persistence::MutationContext;

/// Tuning for [`PaymentService`].
#[derive(Debug, Clone, Copy)]
pub struct PaymentSettings {
    /// Extra attempts after a [`LedgerError::ConcurrencyConflict`].
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// How far in the future `paid_at` may lie.
    pub future_skew: chrono::Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(25),
            future_skew: chrono::Duration::seconds(300),
        }
    }
}

/// Records payments against loans.
///
/// Preconditions are checked in a fixed order so every rejection names
/// the first rule broken: amount, existence, settled, cancelled, balance.
/// The last three are re-checked by the store under the loan's lock.
#[derive(Debug, Clone)]
pub struct PaymentService {
    ctx: LedgerContext,
    settings: PaymentSettings,
}

impl PaymentService {
    /// Creates a new `PaymentService`.
    #[must_use]
    pub fn new(ctx: LedgerContext, settings: PaymentSettings) -> Self {
        Self { ctx, settings }
    }

    /// Returns the active settings.
    #[must_use]
    pub fn settings(&self) -> PaymentSettings {
        self.settings
    }

    /// Records a payment and returns it with the updated loan.
    ///
    /// The payment is attributed to `actor` regardless of the draft's
    /// `recorded_by_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`], [`LedgerError::InvalidAmount`],
    /// [`LedgerError::InvalidRequest`] for a `paid_at` too far ahead,
    /// [`LedgerError::NotFound`], [`LedgerError::AlreadySettled`],
    /// [`LedgerError::LoanCancelled`], [`LedgerError::OverPayment`],
    /// [`LedgerError::ConcurrencyConflict`] once retries are exhausted, or an
    /// allocation, storage or audit error.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        loan: &LoanRef,
        draft: PaymentDraft,
    ) -> Result<PaymentReceipt, LedgerError> {
        require(self.ctx.policy.can_record_payment(actor), "record payments")?;
        validate_amount(draft.amount)?;
        if let Some(paid_at) = draft.paid_at {
            if paid_at > Utc::now() + self.settings.future_skew {
                return Err(LedgerError::InvalidRequest(format!(
                    "paid_at {paid_at} is in the future"
                )));
            }
        }
        let loan = self.ctx.resolve(loan).await?;
        let draft = PaymentDraft {
            recorded_by_id: actor.id,
            ..draft
        };

        let mut attempt = 0u32;
        let mut receipt = loop {
            let ctx = MutationContext {
                actor: actor.id,
                now: Utc::now(),
                audit: self.ctx.audit.as_ref(),
            };
            match self
                .ctx
                .store
                .record_payment(loan.id, draft.clone(), self.ctx.allocator.as_ref(), ctx)
                .await
            {
                Ok(receipt) => break receipt,
                Err(err) if err.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    tracing::warn!(loan = %loan.code, attempt, error = %err, "payment conflict, retrying");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        };

        let now = receipt.payment.created_at;
        let _ = self.ctx.event_bus.publish(LedgerEvent::PaymentRecorded {
            loan_id: receipt.loan.id,
            loan_code: receipt.loan.code.clone(),
            payment_code: receipt.payment.code.clone(),
            amount: receipt.payment.amount,
            previous_balance: receipt.previous_balance,
            new_balance: receipt.loan.balance,
            timestamp: now,
        });
        if receipt.settled() {
            let _ = self.ctx.event_bus.publish(LedgerEvent::LoanSettled {
                loan_id: receipt.loan.id,
                loan_code: receipt.loan.code.clone(),
                timestamp: now,
            });
            tracing::info!(loan = %receipt.loan.code, "loan settled");
        }

        tracing::info!(
            loan = %receipt.loan.code,
            payment = %receipt.payment.code,
            amount = %receipt.payment.amount,
            balance = %receipt.loan.balance,
            "payment recorded"
        );
        receipt.loan = receipt.loan.as_of(now);
        Ok(receipt)
    }
}
