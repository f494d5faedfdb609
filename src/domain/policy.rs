//! Capability checks for ledger operations.
//!
//! Who may do what is decided by an [`AccessPolicy`] injected into the
//! services. The ledger itself never compares role strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::LedgerError;

/// Role resolved by the upstream authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full access.
    Admin,
    /// Issues loans, records payments, edits details.
    Finance,
    /// Records payments.
    Staff,
    /// Read-only.
    Viewer,
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "FINANCE" => Ok(Self::Finance),
            "STAFF" => Ok(Self::Staff),
            "VIEWER" => Ok(Self::Viewer),
            other => Err(LedgerError::Unauthenticated(format!("unknown role: {other}"))),
        }
    }
}

/// The user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// User id from the external user directory.
    pub id: UserId,
    /// Resolved role.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Capability predicates consulted before every operation.
pub trait AccessPolicy: Send + Sync + fmt::Debug {
    /// May issue new loans.
    fn can_issue_loan(&self, actor: &Actor) -> bool;
    /// May record payments.
    fn can_record_payment(&self, actor: &Actor) -> bool;
    /// May cancel loans.
    fn can_cancel_loan(&self, actor: &Actor) -> bool;
    /// May edit loan details.
    fn can_update_loan(&self, actor: &Actor) -> bool;
    /// May read loans and payments.
    fn can_view_loans(&self, actor: &Actor) -> bool;
}

/// Fails with [`LedgerError::Forbidden`] unless `allowed`.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] naming `capability`.
pub fn require(allowed: bool, capability: &'static str) -> Result<(), LedgerError> {
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::Forbidden(capability))
    }
}

/// Default role table.
///
/// | Role    | issue | pay | cancel | update | view |
/// |---------|-------|-----|--------|--------|------|
/// | ADMIN   | yes   | yes | yes    | yes    | yes  |
/// | FINANCE | yes   | yes | no     | yes    | yes  |
/// | STAFF   | no    | yes | no     | no     | yes  |
/// | VIEWER  | no    | no  | no     | no     | yes  |
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn can_issue_loan(&self, actor: &Actor) -> bool {
        matches!(actor.role, Role::Admin | Role::Finance)
    }

    fn can_record_payment(&self, actor: &Actor) -> bool {
        matches!(actor.role, Role::Admin | Role::Finance | Role::Staff)
    }

    fn can_cancel_loan(&self, actor: &Actor) -> bool {
        actor.role == Role::Admin
    }

    fn can_update_loan(&self, actor: &Actor) -> bool {
        matches!(actor.role, Role::Admin | Role::Finance)
    }

    fn can_view_loans(&self, _actor: &Actor) -> bool {
        true
    }
}
