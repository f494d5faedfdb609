//! PostgreSQL implementation of the persistence layer.
//!
//! Every mutation runs in one transaction that first takes the loan row
//! with `SELECT … FOR UPDATE`. Concurrent writers to the same loan queue on
//! that row lock; the second writer re-reads the committed balance when it
//! gets the lock. The audit row is inserted on the same transaction, so a
//! rollback (failed commit, dropped request) removes both.
//!
//! A mutation holds at most one pooled connection at a time. Sequence
//! counters are incremented with a single autocommitted upsert before the
//! loan transaction begins, never while it holds the row lock.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{LOAN_COLUMNS, LoanRow, PAYMENT_COLUMNS, PaymentRow};
use super::{LedgerStore, MutationContext};
use crate::domain::{
    AuditAction, AuditEntry, AuditSink, Loan, LoanChange, LoanCode, LoanId, LoanMutation,
    Payment, PaymentCode, PaymentDraft, PaymentReceipt, SequenceAllocator, WorkerDirectory,
    WorkerId,
};
use crate::error::LedgerError;

/// Maps a database error onto the ledger's error variants.
///
/// Serialization failures and deadlocks become
/// [`LedgerError::ConcurrencyConflict`] so the payment recorder can retry;
/// everything else is reported as [`LedgerError::Storage`].
pub fn storage_error(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40001" | "40P01") => {
                return LedgerError::ConcurrencyConflict(db.message().to_string());
            }
            Some("23505") => {
                return LedgerError::Internal(format!("unique violation: {}", db.message()));
            }
            Some("23514") => {
                return LedgerError::Internal(format!("check violation: {}", db.message()));
            }
            _ => {}
        }
    }
    LedgerError::Storage(err.to_string())
}

/// Orders codes by bucket, then by numeric sequence (wider numbers last).
const LOAN_CODE_ORDER_DESC: &str =
    "split_part(loan_code, '-', 2) DESC, length(loan_code) DESC, loan_code DESC";
const PAYMENT_CODE_ORDER: &str =
    "split_part(payment_code, '-', 2) ASC, length(payment_code) ASC, payment_code ASC";

/// PostgreSQL-backed loan and payment storage.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_loan(
        tx: &mut Transaction<'_, Postgres>,
        loan_id: LoanId,
    ) -> Result<Loan, LedgerError> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(*loan_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| LedgerError::NotFound(loan_id.to_string()))?;
        Loan::try_from(row)
    }

    async fn write_loan_state(
        tx: &mut Transaction<'_, Postgres>,
        loan: &Loan,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE loans SET balance = $2, status = $3, interest_rate = $4, purpose = $5, \
             notes = $6, due_date = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(*loan.id.as_uuid())
        .bind(loan.balance)
        .bind(loan.status.as_str())
        .bind(loan.interest_rate)
        .bind(loan.purpose.as_deref())
        .bind(loan.notes.as_deref())
        .bind(loan.due_date)
        .bind(loan.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_loan(&self, loan: Loan, ctx: MutationContext<'_>) -> Result<Loan, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        sqlx::query(
            "INSERT INTO loans (id, loan_code, worker_id, principal, balance, interest_rate, \
             purpose, notes, status, disbursed_at, due_date, created_by_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(*loan.id.as_uuid())
        .bind(loan.code.as_str())
        .bind(*loan.worker_id.as_uuid())
        .bind(loan.principal)
        .bind(loan.balance)
        .bind(loan.interest_rate)
        .bind(loan.purpose.as_deref())
        .bind(loan.notes.as_deref())
        .bind(loan.status.as_str())
        .bind(loan.disbursed_at)
        .bind(loan.due_date)
        .bind(*loan.created_by_id.as_uuid())
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        insert_audit(&mut *tx, &AuditEntry::loan_issued(&loan, ctx.actor)).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(loan)
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Loan, LedgerError> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1");
        let row = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(*loan_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| LedgerError::NotFound(loan_id.to_string()))?;
        Loan::try_from(row)
    }

    async fn find_loan_by_code(&self, code: &LoanCode) -> Result<Loan, LedgerError> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE loan_code = $1");
        let row = sqlx::query_as::<_, LoanRow>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| LedgerError::NotFound(code.to_string()))?;
        Loan::try_from(row)
    }

    async fn list_loans(&self, worker_id: Option<WorkerId>) -> Result<Vec<Loan>, LedgerError> {
        let rows = if let Some(worker) = worker_id {
            let sql = format!(
                "SELECT {LOAN_COLUMNS} FROM loans WHERE worker_id = $1 \
                 ORDER BY created_at DESC, {LOAN_CODE_ORDER_DESC}"
            );
            sqlx::query_as::<_, LoanRow>(&sql)
                .bind(*worker.as_uuid())
                .fetch_all(&self.pool)
                .await
        } else {
            let sql = format!(
                "SELECT {LOAN_COLUMNS} FROM loans ORDER BY created_at DESC, {LOAN_CODE_ORDER_DESC}"
            );
            sqlx::query_as::<_, LoanRow>(&sql).fetch_all(&self.pool).await
        }
        .map_err(storage_error)?;

        rows.into_iter().map(Loan::try_from).collect()
    }

    async fn list_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>, LedgerError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM loans WHERE id = $1)")
            .bind(*loan_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        if !exists {
            return Err(LedgerError::NotFound(loan_id.to_string()));
        }

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE loan_id = $1 \
             ORDER BY paid_at ASC, {PAYMENT_CODE_ORDER}"
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(*loan_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn mutate_loan(
        &self,
        loan_id: LoanId,
        mutation: &LoanMutation,
        ctx: MutationContext<'_>,
    ) -> Result<LoanChange, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let before = Self::lock_loan(&mut tx, loan_id).await?;
        let mut after = before.clone();
        after.apply(mutation, ctx.now)?;
        Self::write_loan_state(&mut tx, &after).await?;

        let change = LoanChange { before, after };
        let action = match mutation {
            LoanMutation::Cancel => AuditAction::Delete,
            LoanMutation::UpdateDetails(_) => AuditAction::Update,
        };
        insert_audit(&mut *tx, &AuditEntry::loan_changed(&change, action, ctx.actor)).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(change)
    }

    async fn record_payment(
        &self,
        loan_id: LoanId,
        draft: PaymentDraft,
        allocator: &dyn SequenceAllocator,
        ctx: MutationContext<'_>,
    ) -> Result<PaymentReceipt, LedgerError> {
        // Unlocked pre-check; the balance is re-checked under the row lock.
        self.get_loan(loan_id).await?.check_payment(draft.amount)?;
        let code = PaymentCode::allocate(allocator, ctx.now).await?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut loan = Self::lock_loan(&mut tx, loan_id).await?;
        let previous_balance = loan.apply_payment(draft.amount, ctx.now)?;
        let payment = draft.into_payment(loan_id, code, ctx.now);

        sqlx::query(
            "INSERT INTO payments (id, payment_code, loan_id, amount, method, reference, notes, \
             paid_at, recorded_by_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(*payment.id.as_uuid())
        .bind(payment.code.as_str())
        .bind(*loan_id.as_uuid())
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.reference.as_deref())
        .bind(payment.notes.as_deref())
        .bind(payment.paid_at)
        .bind(*payment.recorded_by_id.as_uuid())
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;
        Self::write_loan_state(&mut tx, &loan).await?;

        let receipt = PaymentReceipt {
            payment,
            loan,
            previous_balance,
        };
        insert_audit(&mut *tx, &AuditEntry::payment_recorded(&receipt)).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(receipt)
    }
}

/// Sequence counters in the `sequence_counters` table.
///
/// Each allocation is one autocommitted upsert, so the row lock on the
/// counter is held only for that statement.
#[derive(Debug, Clone)]
pub struct PostgresSequenceAllocator {
    pool: PgPool,
}

impl PostgresSequenceAllocator {
    /// Creates an allocator over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceAllocator for PostgresSequenceAllocator {
    async fn allocate(&self, prefix: &str, bucket: &str) -> Result<u64, LedgerError> {
        let value = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sequence_counters (prefix, bucket, value) VALUES ($1, $2, 1) \
             ON CONFLICT (prefix, bucket) DO UPDATE SET value = sequence_counters.value + 1 \
             RETURNING value",
        )
        .bind(prefix)
        .bind(bucket)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::AllocationFailed(e.to_string()))?;

        u64::try_from(value)
            .map_err(|_| LedgerError::AllocationFailed(format!("negative counter {value}")))
    }
}

/// Inserts one `audit_logs` row on the given executor.
async fn insert_audit<'e>(
    executor: impl PgExecutor<'e>,
    entry: &AuditEntry,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, action, entity, entity_id, old_value, \
         new_value, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4())
    .bind(*entry.actor_id.as_uuid())
    .bind(entry.action.as_str())
    .bind(&entry.entity)
    .bind(&entry.entity_id)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(entry.timestamp)
    .execute(executor)
    .await
    .map_err(|e| LedgerError::AuditDelivery(e.to_string()))?;
    Ok(())
}

/// Audit trail in the `audit_logs` table.
///
/// [`PostgresLedgerStore`] writes its entries into the same table on the
/// mutation's own transaction; this sink serves appends that are not tied
/// to a loan transaction.
#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    /// Creates a sink over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), LedgerError> {
        insert_audit(&self.pool, &entry).await
    }
}

/// Read-only lookup into the `workers` table owned by the HR subsystem.
#[derive(Debug, Clone)]
pub struct PostgresWorkerDirectory {
    pool: PgPool,
}

impl PostgresWorkerDirectory {
    /// Creates a directory over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerDirectory for PostgresWorkerDirectory {
    async fn worker_name(&self, worker_id: WorkerId) -> Result<Option<String>, LedgerError> {
        sqlx::query_scalar::<_, String>("SELECT name FROM workers WHERE id = $1")
            .bind(*worker_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)
    }
}
