//! Loan aggregate and its status state machine.
//!
//! A [`Loan`] is created once with `balance == principal` and afterwards
//! changes only through three paths: a payment (balance and status), a
//! cancellation (status) or a detail edit (non-monetary fields). Every
//! path goes through a method on this type so the rules live in one place
//! regardless of which storage backend performs the write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{LoanCode, LoanId, UserId, WorkerId};
use crate::error::LedgerError;

/// Maximum number of fractional digits accepted on monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Largest accepted monetary amount, the limit of a `NUMERIC(14, 2)` column.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Largest accepted interest rate, in percent.
pub const MAX_INTEREST_RATE: Decimal = Decimal::ONE_HUNDRED;

/// Lifecycle status of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// Outstanding balance, not past due.
    Active,
    /// Outstanding balance, past due.
    Overdue,
    /// Balance reached zero. Terminal.
    PaidOff,
    /// Cancelled by an authorized user. Terminal.
    Cancelled,
}

impl LoanStatus {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Overdue => "OVERDUE",
            Self::PaidOff => "PAID_OFF",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns `true` for `PAID_OFF` and `CANCELLED`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::PaidOff | Self::Cancelled)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "OVERDUE" => Ok(Self::Overdue),
            "PAID_OFF" => Ok(Self::PaidOff),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown loan status: {other}"
            ))),
        }
    }
}

/// Status after a balance change.
///
/// A zero balance settles the loan whatever its prior status; any other
/// balance leaves the status alone.
#[must_use]
pub fn derive_status(current: LoanStatus, new_balance: Decimal) -> LoanStatus {
    if new_balance.is_zero() {
        LoanStatus::PaidOff
    } else {
        current
    }
}

/// Checks that `amount` is a positive value with at most two decimals.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidAmount`] otherwise.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} must be greater than zero"
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} has more than {MONEY_SCALE} decimal places"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} exceeds the maximum of {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

/// Checks that an interest rate is a non-negative percentage.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidAmount`] if the rate is negative, above
/// [`MAX_INTEREST_RATE`] or finer than four decimals.
pub fn validate_interest_rate(rate: Decimal) -> Result<(), LedgerError> {
    if rate < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "interest rate {rate} must not be negative"
        )));
    }
    if rate > MAX_INTEREST_RATE || rate.normalize().scale() > 4 {
        return Err(LedgerError::InvalidAmount(format!(
            "interest rate {rate} must be at most {MAX_INTEREST_RATE} with four decimals"
        )));
    }
    Ok(())
}

/// A loan issued to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    /// Opaque primary key.
    pub id: LoanId,
    /// Human-readable code, `L-YYYYMM-NNNN`.
    pub code: LoanCode,
    /// Borrowing worker.
    pub worker_id: WorkerId,
    /// Amount lent. Immutable.
    pub principal: Decimal,
    /// Outstanding amount, `0 <= balance <= principal`.
    pub balance: Decimal,
    /// Informational interest rate in percent.
    pub interest_rate: Decimal,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Current status.
    pub status: LoanStatus,
    /// When the money was handed out.
    pub disbursed_at: DateTime<Utc>,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Issuing user.
    pub created_by_id: UserId,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new loan.
#[derive(Debug, Clone)]
pub struct NewLoan {
    /// Borrowing worker.
    pub worker_id: WorkerId,
    /// Amount lent.
    pub principal: Decimal,
    /// Informational interest rate in percent.
    pub interest_rate: Decimal,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
}

impl Loan {
    /// Builds a freshly issued loan: full balance, `ACTIVE`, disbursed now.
    #[must_use]
    pub fn issue(new: NewLoan, code: LoanCode, issuer: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: LoanId::new(),
            code,
            worker_id: new.worker_id,
            principal: new.principal,
            balance: new.principal,
            interest_rate: new.interest_rate,
            purpose: new.purpose,
            notes: new.notes,
            status: LoanStatus::Active,
            disbursed_at: now,
            due_date: new.due_date,
            created_by_id: issuer,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as seen at `now`.
    ///
    /// `OVERDUE` is not written back: an `ACTIVE` loan whose due date has
    /// passed is reported as overdue on every read.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> LoanStatus {
        match (self.status, self.due_date) {
            (LoanStatus::Active, Some(due)) if due < now => LoanStatus::Overdue,
            (status, _) => status,
        }
    }

    /// Returns the loan with `status` replaced by its effective status.
    #[must_use]
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    /// Amount repaid so far.
    #[must_use]
    pub fn amount_paid(&self) -> Decimal {
        self.principal - self.balance
    }

    /// Checks payment preconditions against the current state, in order:
    /// settled, cancelled, over the balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadySettled`], [`LedgerError::LoanCancelled`]
    /// or [`LedgerError::OverPayment`].
    pub fn check_payment(&self, amount: Decimal) -> Result<(), LedgerError> {
        match self.status {
            LoanStatus::PaidOff => Err(LedgerError::AlreadySettled(self.code.to_string())),
            LoanStatus::Cancelled => Err(LedgerError::LoanCancelled(self.code.to_string())),
            LoanStatus::Active | LoanStatus::Overdue if amount > self.balance => {
                Err(LedgerError::OverPayment {
                    amount,
                    balance: self.balance,
                })
            }
            LoanStatus::Active | LoanStatus::Overdue => Ok(()),
        }
    }

    /// Applies a validated payment and returns the balance before it.
    ///
    /// # Errors
    ///
    /// Re-runs [`Loan::check_payment`] so the balance can never go negative.
    pub fn apply_payment(
        &mut self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        self.check_payment(amount)?;
        let previous = self.balance;
        self.balance = previous - amount;
        self.status = derive_status(self.status, self.balance);
        self.updated_at = now;
        Ok(previous)
    }

    /// Applies a status or detail mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] if the loan is terminal,
    /// or a validation error from the update itself.
    pub fn apply(&mut self, mutation: &LoanMutation, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                action: mutation.action(),
            });
        }
        match mutation {
            LoanMutation::Cancel => {
                self.status = LoanStatus::Cancelled;
            }
            LoanMutation::UpdateDetails(update) => {
                update.validate()?;
                if let Some(purpose) = &update.purpose {
                    self.purpose = non_empty(purpose);
                }
                if let Some(notes) = &update.notes {
                    self.notes = non_empty(notes);
                }
                if let Some(due_date) = update.due_date {
                    self.due_date = due_date;
                }
                if let Some(rate) = update.interest_rate {
                    self.interest_rate = rate;
                }
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Non-monetary fields that may be edited on a live loan.
///
/// `None` leaves a field unchanged. An empty string clears a text field;
/// `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanDetailsUpdate {
    /// New purpose.
    pub purpose: Option<String>,
    /// New notes.
    pub notes: Option<String>,
    /// New due date, or `Some(None)` to clear it.
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// New interest rate.
    pub interest_rate: Option<Decimal>,
}

impl LoanDetailsUpdate {
    /// Returns `true` if no field would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.purpose.is_none()
            && self.notes.is_none()
            && self.due_date.is_none()
            && self.interest_rate.is_none()
    }

    /// Validates the update on its own.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] for an empty update and
    /// [`LedgerError::InvalidAmount`] for a negative interest rate.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "update must change at least one field".to_string(),
            ));
        }
        if let Some(rate) = self.interest_rate {
            validate_interest_rate(rate)?;
        }
        Ok(())
    }
}

/// A non-payment change to a loan, applied under the loan's lock.
#[derive(Debug, Clone, PartialEq)]
pub enum LoanMutation {
    /// Move to `CANCELLED`.
    Cancel,
    /// Edit non-monetary fields.
    UpdateDetails(LoanDetailsUpdate),
}

impl LoanMutation {
    /// Verb used in transition errors and logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::UpdateDetails(_) => "update",
        }
    }
}

/// Loan state before and after a mutation.
#[derive(Debug, Clone)]
pub struct LoanChange {
    /// State before.
    pub before: Loan,
    /// State after.
    pub after: Loan,
}

/// Filters for listing loans.
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    /// Only loans of this worker.
    pub worker_id: Option<WorkerId>,
    /// Only loans whose effective status matches.
    pub status: Option<LoanStatus>,
    /// Case-insensitive substring over the loan code and worker name.
    pub search: Option<String>,
}

/// Reference to a loan by primary key or by human-readable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanRef {
    /// Opaque id.
    Id(LoanId),
    /// `L-YYYYMM-NNNN` code.
    Code(LoanCode),
}

impl fmt::Display for LoanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Code(code) => write!(f, "{code}"),
        }
    }
}

impl FromStr for LoanRef {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<LoanId>() {
            return Ok(Self::Id(id));
        }
        LoanCode::parse(s)
            .map(Self::Code)
            .map_err(|_| LedgerError::InvalidRequest(format!("not a loan id or code: {s}")))
    }
}

impl From<LoanId> for LoanRef {
    fn from(id: LoanId) -> Self {
        Self::Id(id)
    }
}
