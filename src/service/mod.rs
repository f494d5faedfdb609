//! Service layer: business logic orchestration.
//!
//! [`LoanService`] issues, edits, cancels and reads loans; [`PaymentService`]
//! records repayments. Both check the [`crate::domain::AccessPolicy`] first,
//! delegate the locked read-check-write to the [`LedgerStore`], and publish
//! a [`crate::domain::LedgerEvent`] once the store reports success.

pub mod loan_service;
pub mod payment_service;

use std::sync::Arc;

use sqlx::PgPool;

use crate::domain::{
    AccessPolicy, AuditSink, EventBus, Loan, LoanRef, RolePolicy, SequenceAllocator,
    WorkerDirectory,
};
use crate::error::LedgerError;
use crate::persistence::LedgerStore;
use crate::persistence::memory::{MemoryAuditSink, MemoryLedgerStore, MemorySequenceAllocator};
use crate::persistence::postgres::{
    PostgresAuditSink, PostgresLedgerStore, PostgresSequenceAllocator, PostgresWorkerDirectory,
};

pub use loan_service::{LoanService, LoanSummary};
pub use payment_service::{PaymentService, PaymentSettings};

/// Collaborators shared by the services.
#[derive(Debug, Clone)]
pub struct LedgerContext {
    /// Loan and payment storage.
    pub store: Arc<dyn LedgerStore>,
    /// Code sequence counters.
    pub allocator: Arc<dyn SequenceAllocator>,
    /// Audit trail.
    pub audit: Arc<dyn AuditSink>,
    /// Worker lookups.
    pub directory: Arc<dyn WorkerDirectory>,
    /// Capability checks.
    pub policy: Arc<dyn AccessPolicy>,
    /// Event broadcast.
    pub event_bus: EventBus,
}

impl LedgerContext {
    /// Loads a loan by id or by code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the reference matches no loan.
    pub async fn resolve(&self, loan: &LoanRef) -> Result<Loan, LedgerError> {
        match loan {
            LoanRef::Id(id) => self.store.get_loan(*id).await,
            LoanRef::Code(code) => self.store.find_loan_by_code(code).await,
        }
    }

    /// Wires the in-memory backends with the default [`RolePolicy`].
    #[must_use]
    pub fn in_memory(directory: Arc<dyn WorkerDirectory>, event_bus: EventBus) -> Self {
        Self {
            store: Arc::new(MemoryLedgerStore::new()),
            allocator: Arc::new(MemorySequenceAllocator::new()),
            audit: Arc::new(MemoryAuditSink::new()),
            directory,
            policy: Arc::new(RolePolicy),
            event_bus,
        }
    }

    /// Wires the PostgreSQL backends over one pool with the default
    /// [`RolePolicy`].
    ///
    /// Loan mutations write their audit rows inside their own transaction;
    /// the [`PostgresAuditSink`] targets the same `audit_logs` table.
    #[must_use]
    pub fn postgres(pool: PgPool, event_bus: EventBus) -> Self {
        Self {
            store: Arc::new(PostgresLedgerStore::new(pool.clone())),
            allocator: Arc::new(PostgresSequenceAllocator::new(pool.clone())),
            audit: Arc::new(PostgresAuditSink::new(pool.clone())),
            directory: Arc::new(PostgresWorkerDirectory::new(pool)),
            policy: Arc::new(RolePolicy),
            event_bus,
        }
    }
}
