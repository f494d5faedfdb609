//! Loan service: issuance, cancellation, detail edits and reads.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use super::LedgerContext;
use crate::domain::policy::require;
use crate::domain::{
    Actor, LedgerEvent, Loan, LoanCode, LoanDetailsUpdate, LoanFilter, LoanMutation, LoanRef,
    NewLoan, Payment, WorkerId, validate_amount, validate_interest_rate,
};
use crate::error::LedgerError;
use crate::persistence::MutationContext;

/// A loan together with its payment history.
#[derive(Debug, Clone)]
pub struct LoanSummary {
    /// Loan with its effective status.
    pub loan: Loan,
    /// Payments ordered by `paid_at`.
    pub payments: Vec<Payment>,
    /// Sum of all payment amounts.
    pub total_paid: Decimal,
}

/// Orchestration layer for loan lifecycle operations.
///
/// Stateless coordinator over a [`LedgerContext`]. Every mutation follows
/// the pattern: check capability → validate → locked store mutation with
/// audit → emit event → return the loan as of now.
#[derive(Debug, Clone)]
pub struct LoanService {
    ctx: LedgerContext,
}

impl LoanService {
    /// Creates a new `LoanService`.
    #[must_use]
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub fn context(&self) -> &LedgerContext {
        &self.ctx
    }

    /// Issues a loan to a worker. The only way a loan comes into existence.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`], [`LedgerError::InvalidAmount`],
    /// [`LedgerError::WorkerNotFound`], [`LedgerError::AllocationFailed`]
    /// or a storage or audit error.
    pub async fn issue_loan(&self, actor: &Actor, new: NewLoan) -> Result<Loan, LedgerError> {
        require(self.ctx.policy.can_issue_loan(actor), "issue loans")?;
        validate_amount(new.principal)?;
        validate_interest_rate(new.interest_rate)?;
        if self.ctx.directory.worker_name(new.worker_id).await?.is_none() {
            return Err(LedgerError::WorkerNotFound(new.worker_id.into()));
        }

        let now = Utc::now();
        let code = LoanCode::allocate(self.ctx.allocator.as_ref(), now).await?;
        let loan = Loan::issue(new, code, actor.id, now);
        let loan = self
            .ctx
            .store
            .insert_loan(loan, self.mutation_context(actor, now))
            .await?;

        let _ = self.ctx.event_bus.publish(LedgerEvent::LoanIssued {
            loan_id: loan.id,
            loan_code: loan.code.clone(),
            worker_id: loan.worker_id,
            principal: loan.principal,
            timestamp: now,
        });

        tracing::info!(
            loan = %loan.code,
            worker = %loan.worker_id,
            principal = %loan.principal,
            "loan issued"
        );
        Ok(loan.as_of(now))
    }

    /// Cancels an `ACTIVE` or `OVERDUE` loan. The balance is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`], [`LedgerError::NotFound`],
    /// [`LedgerError::InvalidTransition`] or a storage or audit error.
    pub async fn cancel_loan(&self, actor: &Actor, loan: &LoanRef) -> Result<Loan, LedgerError> {
        require(self.ctx.policy.can_cancel_loan(actor), "cancel loans")?;
        let current = self.ctx.resolve(loan).await?;

        let now = Utc::now();
        let change = self
            .ctx
            .store
            .mutate_loan(current.id, &LoanMutation::Cancel, self.mutation_context(actor, now))
            .await?;
        let loan = change.after;

        let _ = self.ctx.event_bus.publish(LedgerEvent::LoanCancelled {
            loan_id: loan.id,
            loan_code: loan.code.clone(),
            balance: loan.balance,
            timestamp: now,
        });

        tracing::info!(loan = %loan.code, balance = %loan.balance, "loan cancelled");
        Ok(loan.as_of(now))
    }

    /// Edits non-monetary fields of a live loan.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`], [`LedgerError::InvalidRequest`]
    /// for an empty update, [`LedgerError::InvalidAmount`] for a negative
    /// rate, [`LedgerError::NotFound`], [`LedgerError::InvalidTransition`]
    /// or a storage or audit error.
    pub async fn update_loan_details(
        &self,
        actor: &Actor,
        loan: &LoanRef,
        update: LoanDetailsUpdate,
    ) -> Result<Loan, LedgerError> {
        require(self.ctx.policy.can_update_loan(actor), "update loans")?;
        update.validate()?;
        let current = self.ctx.resolve(loan).await?;

        let now = Utc::now();
        let change = self
            .ctx
            .store
            .mutate_loan(
                current.id,
                &LoanMutation::UpdateDetails(update),
                self.mutation_context(actor, now),
            )
            .await?;
        let loan = change.after;

        let _ = self.ctx.event_bus.publish(LedgerEvent::LoanUpdated {
            loan_id: loan.id,
            loan_code: loan.code.clone(),
            timestamp: now,
        });

        tracing::info!(loan = %loan.code, "loan details updated");
        Ok(loan.as_of(now))
    }

    /// Loads one loan with its effective status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] or [`LedgerError::NotFound`].
    pub async fn get_loan(&self, actor: &Actor, loan: &LoanRef) -> Result<Loan, LedgerError> {
        require(self.ctx.policy.can_view_loans(actor), "view loans")?;
        Ok(self.ctx.resolve(loan).await?.as_of(Utc::now()))
    }

    /// Lists loans matching `filter`, newest first.
    ///
    /// The status filter applies to the effective status, so `OVERDUE`
    /// selects active loans past their due date. The search term matches
    /// case-insensitively against the loan code and the worker's name.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] or a storage error.
    pub async fn list_loans(
        &self,
        actor: &Actor,
        filter: &LoanFilter,
    ) -> Result<Vec<Loan>, LedgerError> {
        require(self.ctx.policy.can_view_loans(actor), "view loans")?;
        let now = Utc::now();
        let loans = self.ctx.store.list_loans(filter.worker_id).await?;

        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let mut names: HashMap<WorkerId, Option<String>> = HashMap::new();

        let mut matched = Vec::with_capacity(loans.len());
        for loan in loans {
            let loan = loan.as_of(now);
            if filter.status.is_some_and(|status| loan.status != status) {
                continue;
            }
            if let Some(needle) = &needle {
                if !self.matches_search(&loan, needle, &mut names).await? {
                    continue;
                }
            }
            matched.push(loan);
        }
        Ok(matched)
    }

    /// Lists the payments of a loan ordered by `paid_at`, then code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] or [`LedgerError::NotFound`].
    pub async fn list_payments(
        &self,
        actor: &Actor,
        loan: &LoanRef,
    ) -> Result<Vec<Payment>, LedgerError> {
        require(self.ctx.policy.can_view_loans(actor), "view loans")?;
        let loan = self.ctx.resolve(loan).await?;
        self.ctx.store.list_payments(loan.id).await
    }

    /// Loads a loan with its payments and the total repaid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] or [`LedgerError::NotFound`].
    pub async fn loan_summary(
        &self,
        actor: &Actor,
        loan: &LoanRef,
    ) -> Result<LoanSummary, LedgerError> {
        require(self.ctx.policy.can_view_loans(actor), "view loans")?;
        let loan = self.ctx.resolve(loan).await?;
        let payments = self.ctx.store.list_payments(loan.id).await?;
        let total_paid = payments.iter().map(|p| p.amount).sum();
        Ok(LoanSummary {
            loan: loan.as_of(Utc::now()),
            payments,
            total_paid,
        })
    }

    async fn matches_search(
        &self,
        loan: &Loan,
        needle: &str,
        names: &mut HashMap<WorkerId, Option<String>>,
    ) -> Result<bool, LedgerError> {
        if loan.code.as_str().to_lowercase().contains(needle) {
            return Ok(true);
        }
        let name = match names.get(&loan.worker_id) {
            Some(name) => name.clone(),
            None => {
                let name = self.ctx.directory.worker_name(loan.worker_id).await?;
                names.insert(loan.worker_id, name.clone());
                name
            }
        };
        Ok(name.is_some_and(|n| n.to_lowercase().contains(needle)))
    }

    fn mutation_context(&self, actor: &Actor, now: chrono::DateTime<Utc>) -> MutationContext<'_> {
        MutationContext {
            actor: actor.id,
            now,
            audit: self.ctx.audit.as_ref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{AuditAction, LoanId, LoanStatus, Role};
    use crate::service::test_support::{actor, harness};
    use rust_decimal_macros::dec;

    fn new_loan(worker_id: WorkerId, principal: Decimal) -> NewLoan {
        NewLoan {
            worker_id,
            principal,
            interest_rate: dec!(0),
            purpose: Some("emergency".to_string()),
            notes: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn issue_loan_allocates_code_and_emits_event() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let mut rx = h.ctx.event_bus.subscribe();
        let admin = actor(Role::Admin);

        let Ok(loan) = service.issue_loan(&admin, new_loan(h.worker, dec!(5000))).await else {
            panic!("issue failed");
        };
        assert_eq!(loan.code.sequence(), 1);
        assert_eq!(loan.balance, dec!(5000));
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.created_by_id, admin.id);

        let Ok(event) = rx.recv().await else {
            panic!("expected event");
        };
        assert_eq!(event.event_type_str(), "loan_issued");

        let entries = h.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().map(|e| e.action), Some(AuditAction::Create));
    }

    #[tokio::test]
    async fn issue_loan_rejects_bad_input() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);

        assert!(matches!(
            service.issue_loan(&admin, new_loan(h.worker, dec!(0))).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.issue_loan(&admin, new_loan(WorkerId::new(), dec!(10))).await,
            Err(LedgerError::WorkerNotFound(_))
        ));
        assert!(matches!(
            service
                .issue_loan(&actor(Role::Staff), new_loan(h.worker, dec!(10)))
                .await,
            Err(LedgerError::Forbidden(_))
        ));
        assert_eq!(h.audit.len().await, 0);
    }

    #[tokio::test]
    async fn sequential_issues_number_without_gaps() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let finance = actor(Role::Finance);

        for expected in 1..=3 {
            let Ok(loan) = service.issue_loan(&finance, new_loan(h.worker, dec!(100))).await
            else {
                panic!("issue failed");
            };
            assert_eq!(loan.code.sequence(), expected);
        }
    }

    #[tokio::test]
    async fn cancel_keeps_balance_and_blocks_second_cancel() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);
        let Ok(loan) = service.issue_loan(&admin, new_loan(h.worker, dec!(500))).await else {
            panic!("issue failed");
        };

        let Ok(cancelled) = service.cancel_loan(&admin, &LoanRef::Id(loan.id)).await else {
            panic!("cancel failed");
        };
        assert_eq!(cancelled.status, LoanStatus::Cancelled);
        assert_eq!(cancelled.balance, dec!(500));

        assert!(matches!(
            service.cancel_loan(&admin, &LoanRef::Code(loan.code.clone())).await,
            Err(LedgerError::InvalidTransition { .. })
        ));

        let entries = h.audit.entries().await;
        let Some(entry) = entries.last() else {
            panic!("cancel audited");
        };
        assert_eq!(entry.action, AuditAction::Delete);
        assert!(entry.old_value.is_some());
    }

    #[tokio::test]
    async fn cancelled_loan_rejects_detail_updates() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);
        let Ok(loan) = service.issue_loan(&admin, new_loan(h.worker, dec!(500))).await else {
            panic!("issue failed");
        };
        let Ok(_) = service.cancel_loan(&admin, &loan.id.into()).await else {
            panic!("cancel failed");
        };
        let audited = h.audit.len().await;

        let update = LoanDetailsUpdate {
            purpose: Some("school fees".to_string()),
            ..LoanDetailsUpdate::default()
        };
        assert!(matches!(
            service.update_loan_details(&admin, &loan.id.into(), update).await,
            Err(LedgerError::InvalidTransition {
                from: LoanStatus::Cancelled,
                action: "update"
            })
        ));

        let Ok(stored) = service.get_loan(&admin, &loan.id.into()).await else {
            panic!("loan readable");
        };
        assert_eq!(stored.purpose, loan.purpose);
        assert_eq!(stored.status, LoanStatus::Cancelled);
        assert_eq!(h.audit.len().await, audited);
    }

    #[tokio::test]
    async fn finance_may_not_cancel() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let Ok(loan) = service
            .issue_loan(&actor(Role::Finance), new_loan(h.worker, dec!(500)))
            .await
        else {
            panic!("issue failed");
        };
        assert!(matches!(
            service.cancel_loan(&actor(Role::Finance), &loan.id.into()).await,
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn update_details_and_derived_overdue() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);
        let Ok(loan) = service.issue_loan(&admin, new_loan(h.worker, dec!(300))).await else {
            panic!("issue failed");
        };

        let past = Utc::now() - chrono::Duration::days(2);
        let update = LoanDetailsUpdate {
            due_date: Some(Some(past)),
            ..LoanDetailsUpdate::default()
        };
        let Ok(updated) = service
            .update_loan_details(&admin, &loan.id.into(), update)
            .await
        else {
            panic!("update failed");
        };
        assert_eq!(updated.status, LoanStatus::Overdue);
        assert_eq!(updated.balance, dec!(300));

        let Ok(stored) = h.ctx.store.get_loan(loan.id).await else {
            panic!("loan exists");
        };
        assert_eq!(stored.status, LoanStatus::Active);

        let overdue = LoanFilter {
            status: Some(LoanStatus::Overdue),
            ..LoanFilter::default()
        };
        assert_eq!(service.list_loans(&admin, &overdue).await.map(|l| l.len()).ok(), Some(1));
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);
        assert!(matches!(
            service
                .update_loan_details(&admin, &LoanId::new().into(), LoanDetailsUpdate::default())
                .await,
            Err(LedgerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn search_matches_code_and_worker_name() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let admin = actor(Role::Admin);
        let Ok(loan) = service.issue_loan(&admin, new_loan(h.worker, dec!(300))).await else {
            panic!("issue failed");
        };

        let by_name = LoanFilter {
            search: Some("santos".to_string()),
            ..LoanFilter::default()
        };
        assert_eq!(service.list_loans(&admin, &by_name).await.map(|l| l.len()).ok(), Some(1));

        let by_code = LoanFilter {
            search: Some(loan.code.as_str().to_lowercase()),
            ..LoanFilter::default()
        };
        assert_eq!(service.list_loans(&admin, &by_code).await.map(|l| l.len()).ok(), Some(1));

        let none = LoanFilter {
            search: Some("nobody".to_string()),
            ..LoanFilter::default()
        };
        assert_eq!(service.list_loans(&admin, &none).await.map(|l| l.len()).ok(), Some(0));
    }

    #[tokio::test]
    async fn summary_of_unpaid_loan() {
        let h = harness().await;
        let service = LoanService::new(h.ctx.clone());
        let viewer = actor(Role::Viewer);
        let Ok(loan) = service
            .issue_loan(&actor(Role::Admin), new_loan(h.worker, dec!(300)))
            .await
        else {
            panic!("issue failed");
        };

        let Ok(summary) = service.loan_summary(&viewer, &LoanRef::Code(loan.code)).await else {
            panic!("summary failed");
        };
        assert!(summary.payments.is_empty());
        assert_eq!(summary.total_paid, dec!(0));
        assert_eq!(summary.loan.id, loan.id);
    }

}
