//! Domain layer: ledger types, rules and collaborator contracts.
//!
//! Loans, payments and their codes, the status state machine, the audit
//! and event records, and the traits through which the ledger reaches its
//! external collaborators (sequence counters, audit sink, worker
//! directory, access policy).

pub mod audit;
pub mod directory;
pub mod event_bus;
pub mod ids;
pub mod ledger_event;
pub mod loan;
pub mod payment;
pub mod policy;
pub mod sequence;

pub use audit::{AuditAction, AuditEntry, AuditSink};
pub use directory::WorkerDirectory;
pub use event_bus::EventBus;
pub use ids::{LoanId, PaymentId, UserId, WorkerId};
pub use ledger_event::LedgerEvent;
pub use loan::{
    Loan, LoanChange, LoanDetailsUpdate, LoanFilter, LoanMutation, LoanRef, LoanStatus, NewLoan,
    derive_status, validate_amount, validate_interest_rate,
};
pub use payment::{Payment, PaymentDraft, PaymentMethod, PaymentReceipt};
pub use policy::{AccessPolicy, Actor, Role, RolePolicy};
pub use sequence::{LoanCode, PaymentCode, SequenceAllocator, SequenceScope};
