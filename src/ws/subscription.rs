//! Per-connection subscription manager.
//!
//! Tracks which loans a WebSocket client is subscribed to and provides
//! server-side event filtering. Loans may be named by id or by code.

use std::collections::HashSet;

use crate::domain::{LedgerEvent, LoanCode, LoanId, LoanRef};

/// Manages the set of loan subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed loan ids. Ignored while `subscribe_all` is set.
    loan_ids: HashSet<LoanId>,
    /// Subscribed loan codes. Ignored while `subscribe_all` is set.
    loan_codes: HashSet<LoanCode>,
    /// Whether the client subscribes to all loans (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds loans to the subscription set and optionally enables the wildcard.
    pub fn subscribe(&mut self, loans: &[LoanRef], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        for loan in loans {
            match loan {
                LoanRef::Id(id) => {
                    self.loan_ids.insert(*id);
                }
                LoanRef::Code(code) => {
                    self.loan_codes.insert(code.clone());
                }
            }
        }
    }

    /// Removes loans from the subscription set and optionally drops the
    /// wildcard.
    pub fn unsubscribe(&mut self, loans: &[LoanRef], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for loan in loans {
            match loan {
                LoanRef::Id(id) => {
                    self.loan_ids.remove(id);
                }
                LoanRef::Code(code) => {
                    self.loan_codes.remove(code);
                }
            }
        }
    }

    /// Returns `true` if the event concerns a subscribed loan.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.subscribe_all
            || self.loan_ids.contains(&event.loan_id())
            || self.loan_codes.contains(event.loan_code())
    }

    /// Returns the number of explicitly subscribed loans.
    #[must_use]
    pub fn count(&self) -> usize {
        self.loan_ids.len() + self.loan_codes.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn code(seq: u32) -> LoanCode {
        let Ok(code) = LoanCode::parse(&format!("L-202601-{seq:04}")) else {
            panic!("valid code");
        };
        code
    }

    fn event(loan_id: LoanId, seq: u32) -> LedgerEvent {
        LedgerEvent::LoanUpdated {
            loan_id,
            loan_code: code(seq),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&event(LoanId::new(), 1)));
    }

    #[test]
    fn subscribe_by_id_or_code() {
        let mut mgr = SubscriptionManager::new();
        let id = LoanId::new();
        mgr.subscribe(&[LoanRef::Id(id), LoanRef::Code(code(7))], false);
        assert!(mgr.matches(&event(id, 1)));
        assert!(mgr.matches(&event(LoanId::new(), 7)));
        assert!(!mgr.matches(&event(LoanId::new(), 2)));
        assert_eq!(mgr.count(), 2);
    }

    #[test]
    fn wildcard_on_and_off() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(&event(LoanId::new(), 1)));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.is_subscribed_all());
        assert!(!mgr.matches(&event(LoanId::new(), 1)));
    }

    #[test]
    fn unsubscribe_removes_loan() {
        let mut mgr = SubscriptionManager::new();
        let id = LoanId::new();
        mgr.subscribe(&[LoanRef::Id(id)], false);
        mgr.unsubscribe(&[LoanRef::Id(id)], false);
        assert!(!mgr.matches(&event(id, 1)));
        assert_eq!(mgr.count(), 0);
    }
}
