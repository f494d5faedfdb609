//! In-memory backends with per-loan fine-grained locking.
//!
//! [`MemoryLedgerStore`] keeps every loan together with its payments in a
//! slot protected by its own [`tokio::sync::Mutex`]. Operations on
//! different loans proceed in parallel; operations on the same loan are
//! serialized by that mutex, which is held across the whole
//! check-allocate-audit-write sequence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use super::{LedgerStore, MutationContext};
use crate::domain::{
    AuditAction, AuditEntry, AuditSink, Loan, LoanChange, LoanCode, LoanId, LoanMutation,
    Payment, PaymentCode, PaymentDraft, PaymentReceipt, SequenceAllocator, WorkerDirectory,
    WorkerId,
};
use crate::error::LedgerError;

/// A loan and its payments, locked together.
#[derive(Debug)]
struct LoanSlot {
    loan: Loan,
    payments: Vec<Payment>,
}

/// Loan and payment storage held in process memory.
///
/// # Concurrency
///
/// - Reads and writes on different loans are concurrent.
/// - Writes to the same loan are serialized.
/// - A reader sees a loan and its payments from the same instant.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    loans: RwLock<HashMap<LoanId, Arc<Mutex<LoanSlot>>>>,
    codes: RwLock<HashMap<LoanCode, LoanId>>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, loan_id: LoanId) -> Result<Arc<Mutex<LoanSlot>>, LedgerError> {
        let map = self.loans.read().await;
        map.get(&loan_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(loan_id.to_string()))
    }

    /// Returns the number of loans held.
    pub async fn len(&self) -> usize {
        self.loans.read().await.len()
    }

    /// Returns `true` if no loan has been issued.
    pub async fn is_empty(&self) -> bool {
        self.loans.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_loan(&self, loan: Loan, ctx: MutationContext<'_>) -> Result<Loan, LedgerError> {
        // Lock order: codes, then loans.
        let mut codes = self.codes.write().await;
        let mut loans = self.loans.write().await;
        if codes.contains_key(&loan.code) {
            return Err(LedgerError::Internal(format!(
                "loan code {} already exists",
                loan.code
            )));
        }
        ctx.audit
            .append(AuditEntry::loan_issued(&loan, ctx.actor))
            .await?;

        codes.insert(loan.code.clone(), loan.id);
        loans.insert(
            loan.id,
            Arc::new(Mutex::new(LoanSlot {
                loan: loan.clone(),
                payments: Vec::new(),
            })),
        );
        Ok(loan)
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Loan, LedgerError> {
        let slot = self.slot(loan_id).await?;
        let slot = slot.lock().await;
        Ok(slot.loan.clone())
    }

    async fn find_loan_by_code(&self, code: &LoanCode) -> Result<Loan, LedgerError> {
        let loan_id = self
            .codes
            .read()
            .await
            .get(code)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(code.to_string()))?;
        self.get_loan(loan_id).await
    }

    async fn list_loans(&self, worker_id: Option<WorkerId>) -> Result<Vec<Loan>, LedgerError> {
        let slots: Vec<Arc<Mutex<LoanSlot>>> = self.loans.read().await.values().cloned().collect();
        let mut loans = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = slot.lock().await;
            if worker_id.is_some_and(|worker| slot.loan.worker_id != worker) {
                continue;
            }
            loans.push(slot.loan.clone());
        }
        loans.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.code.cmp(&a.code))
        });
        Ok(loans)
    }

    async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>, LedgerError> {
        let slot = self.slot(loan_id).await?;
        let slot = slot.lock().await;
        let mut payments = slot.payments.clone();
        payments.sort_by(|a, b| a.paid_at.cmp(&b.paid_at).then_with(|| a.code.cmp(&b.code)));
        Ok(payments)
    }

    async fn mutate_loan(
        &self,
        loan_id: LoanId,
        mutation: &LoanMutation,
        ctx: MutationContext<'_>,
    ) -> Result<LoanChange, LedgerError> {
        let slot = self.slot(loan_id).await?;
        let mut slot = slot.lock().await;

        let before = slot.loan.clone();
        let mut after = before.clone();
        after.apply(mutation, ctx.now)?;
        let change = LoanChange { before, after };

        let action = match mutation {
            LoanMutation::Cancel => AuditAction::Delete,
            LoanMutation::UpdateDetails(_) => AuditAction::Update,
        };
        ctx.audit
            .append(AuditEntry::loan_changed(&change, action, ctx.actor))
            .await?;

        slot.loan = change.after.clone();
        Ok(change)
    }

    async fn record_payment(
        &self,
        loan_id: LoanId,
        draft: PaymentDraft,
        allocator: &dyn SequenceAllocator,
        ctx: MutationContext<'_>,
    ) -> Result<PaymentReceipt, LedgerError> {
        let slot = self.slot(loan_id).await?;
        let mut slot = slot.lock().await;

        slot.loan.check_payment(draft.amount)?;
        let code = PaymentCode::allocate(allocator, ctx.now).await?;

        let mut loan = slot.loan.clone();
        let previous_balance = loan.apply_payment(draft.amount, ctx.now)?;
        let receipt = PaymentReceipt {
            payment: draft.into_payment(loan_id, code, ctx.now),
            loan,
            previous_balance,
        };
        ctx.audit
            .append(AuditEntry::payment_recorded(&receipt))
            .await?;

        slot.loan = receipt.loan.clone();
        slot.payments.push(receipt.payment.clone());
        Ok(receipt)
    }
}

/// Sequence counters held in process memory.
///
/// The mutex is held only for the increment itself.
#[derive(Debug, Default)]
pub struct MemorySequenceAllocator {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl MemorySequenceAllocator {
    /// Creates an allocator with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last value handed out for `(prefix, bucket)`.
    pub async fn current(&self, prefix: &str, bucket: &str) -> u64 {
        self.counters
            .lock()
            .await
            .get(&(prefix.to_string(), bucket.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SequenceAllocator for MemorySequenceAllocator {
    async fn allocate(&self, prefix: &str, bucket: &str) -> Result<u64, LedgerError> {
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry((prefix.to_string(), bucket.to_string()))
            .or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| {
            LedgerError::AllocationFailed(format!("counter {prefix}/{bucket} exhausted"))
        })?;
        Ok(*counter)
    }
}

/// Append-only audit trail held in process memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry in append order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Returns the number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing has been appended.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), LedgerError> {
        tracing::debug!(
            action = %entry.action,
            entity = %entry.entity,
            entity_id = %entry.entity_id,
            "audit entry appended"
        );
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// One worker record as loaded from a seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSeed {
    /// Worker id.
    pub id: WorkerId,
    /// Display name.
    pub name: String,
}

/// Worker directory held in process memory.
#[derive(Debug, Default)]
pub struct MemoryWorkerDirectory {
    workers: RwLock<HashMap<WorkerId, String>>,
}

impl MemoryWorkerDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory from seed records.
    #[must_use]
    pub fn from_seeds(seeds: impl IntoIterator<Item = WorkerSeed>) -> Self {
        let workers = seeds.into_iter().map(|s| (s.id, s.name)).collect();
        Self {
            workers: RwLock::new(workers),
        }
    }

    /// Parses a JSON array of `{"id": "<uuid>", "name": "..."}` records.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let seeds: Vec<WorkerSeed> = serde_json::from_str(json)
            .map_err(|e| LedgerError::InvalidRequest(format!("invalid worker seed file: {e}")))?;
        Ok(Self::from_seeds(seeds))
    }

    /// Adds or renames a worker.
    pub async fn insert(&self, worker_id: WorkerId, name: impl Into<String>) {
        self.workers.write().await.insert(worker_id, name.into());
    }
}

#[async_trait]
impl WorkerDirectory for MemoryWorkerDirectory {
    async fn worker_name(&self, worker_id: WorkerId) -> Result<Option<String>, LedgerError> {
        Ok(self.workers.read().await.get(&worker_id).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{LoanStatus, NewLoan, PaymentMethod, UserId};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    async fn issue(store: &MemoryLedgerStore, audit: &MemoryAuditSink, seq: u64) -> Loan {
        let Ok(code) = LoanCode::parse(&format!("L-202601-{seq:04}")) else {
            panic!("valid code");
        };
        let actor = UserId::new();
        let loan = Loan::issue(
            NewLoan {
                worker_id: WorkerId::new(),
                principal: dec!(100),
                interest_rate: dec!(0),
                purpose: None,
                notes: None,
                due_date: None,
            },
            code,
            actor,
            Utc::now(),
        );
        let ctx = MutationContext {
            actor,
            now: Utc::now(),
            audit,
        };
        let Ok(loan) = store.insert_loan(loan, ctx).await else {
            panic!("insert failed");
        };
        loan
    }

    fn draft(amount: Decimal) -> PaymentDraft {
        PaymentDraft {
            amount,
            method: PaymentMethod::Cash,
            reference: None,
            notes: None,
            paid_at: None,
            recorded_by_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_by_id_and_code() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let loan = issue(&store, &audit, 1).await;

        assert!(store.get_loan(loan.id).await.is_ok());
        let Ok(by_code) = store.find_loan_by_code(&loan.code).await else {
            panic!("lookup by code failed");
        };
        assert_eq!(by_code.id, loan.id);
        assert_eq!(audit.len().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected_without_audit() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let first = issue(&store, &audit, 1).await;

        let mut dup = first.clone();
        dup.id = LoanId::new();
        let ctx = MutationContext {
            actor: first.created_by_id,
            now: Utc::now(),
            audit: &audit,
        };
        assert!(matches!(
            store.insert_loan(dup, ctx).await,
            Err(LedgerError::Internal(_))
        ));
        assert_eq!(audit.len().await, 1);
    }

    #[tokio::test]
    async fn abandoned_insert_leaves_no_audit_entry() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let Ok(code) = LoanCode::parse("L-202601-0001") else {
            panic!("valid code");
        };
        let actor = UserId::new();
        let loan = Loan::issue(
            NewLoan {
                worker_id: WorkerId::new(),
                principal: dec!(100),
                interest_rate: dec!(0),
                purpose: None,
                notes: None,
                due_date: None,
            },
            code,
            actor,
            Utc::now(),
        );
        let ctx = MutationContext {
            actor,
            now: Utc::now(),
            audit: &audit,
        };

        // A reader holds the loan map, so the insert stalls until it is dropped.
        let reader = store.loans.read().await;
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.insert_loan(loan, ctx),
        )
        .await;
        drop(reader);

        assert!(outcome.is_err(), "insert should still be waiting");
        assert!(audit.is_empty().await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn missing_loan_is_not_found() {
        let store = MemoryLedgerStore::new();
        assert!(matches!(
            store.get_loan(LoanId::new()).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(store.list_payments(LoanId::new()).await.is_err());
    }

    #[tokio::test]
    async fn rejected_payment_leaves_no_trace() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let allocator = MemorySequenceAllocator::new();
        let loan = issue(&store, &audit, 1).await;
        let ctx = MutationContext {
            actor: UserId::new(),
            now: Utc::now(),
            audit: &audit,
        };

        let result = store
            .record_payment(loan.id, draft(dec!(150)), &allocator, ctx)
            .await;
        assert!(matches!(result, Err(LedgerError::OverPayment { .. })));

        let bucket = crate::domain::SequenceScope::Payment.bucket_key(ctx.now);
        assert_eq!(allocator.current("P", &bucket).await, 0);
        assert_eq!(audit.len().await, 1);
        let Ok(payments) = store.list_payments(loan.id).await else {
            panic!("loan exists");
        };
        assert!(payments.is_empty());
    }

    #[tokio::test]
    async fn payment_updates_loan_and_history_together() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let allocator = MemorySequenceAllocator::new();
        let loan = issue(&store, &audit, 1).await;
        let ctx = MutationContext {
            actor: UserId::new(),
            now: Utc::now(),
            audit: &audit,
        };

        let Ok(receipt) = store
            .record_payment(loan.id, draft(dec!(100)), &allocator, ctx)
            .await
        else {
            panic!("payment failed");
        };
        assert!(receipt.settled());
        assert_eq!(receipt.payment.code.sequence(), 1);

        let Ok(stored) = store.get_loan(loan.id).await else {
            panic!("loan exists");
        };
        assert_eq!(stored.balance, dec!(0));
        assert_eq!(stored.status, LoanStatus::PaidOff);
        assert_eq!(store.list_payments(loan.id).await.map(|p| p.len()).ok(), Some(1));
    }

    #[tokio::test]
    async fn list_filters_by_worker_newest_first() {
        let store = MemoryLedgerStore::new();
        let audit = MemoryAuditSink::new();
        let first = issue(&store, &audit, 1).await;
        let second = issue(&store, &audit, 2).await;

        let Ok(all) = store.list_loans(None).await else {
            panic!("list failed");
        };
        assert_eq!(all.len(), 2);
        assert_eq!(all.first().map(|l| l.id), Some(second.id));
        assert_eq!(all.last().map(|l| l.id), Some(first.id));

        let Ok(only) = store.list_loans(Some(second.worker_id)).await else {
            panic!("list failed");
        };
        assert_eq!(only.len(), 1);
        assert_eq!(only.first().map(|l| l.id), Some(second.id));
    }

    #[tokio::test]
    async fn allocator_counts_per_bucket() {
        let allocator = MemorySequenceAllocator::new();
        assert_eq!(allocator.allocate("L", "202601").await.ok(), Some(1));
        assert_eq!(allocator.allocate("L", "202601").await.ok(), Some(2));
        assert_eq!(allocator.allocate("L", "202602").await.ok(), Some(1));
        assert_eq!(allocator.allocate("P", "20260101").await.ok(), Some(1));
        assert_eq!(allocator.current("L", "202601").await, 2);
    }

    #[tokio::test]
    async fn worker_directory_from_json() {
        let id = WorkerId::new();
        let json = format!(r#"[{{"id": "{id}", "name": "Ana Reyes"}}]"#);
        let Ok(directory) = MemoryWorkerDirectory::from_json(&json) else {
            panic!("valid seed json");
        };
        assert_eq!(
            directory.worker_name(id).await.ok().flatten().as_deref(),
            Some("Ana Reyes")
        );
        assert_eq!(directory.worker_name(WorkerId::new()).await.ok().flatten(), None);
        assert!(MemoryWorkerDirectory::from_json("{").is_err());
    }
}
