//! Database rows for loans and payments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Loan, LoanCode, Payment, PaymentCode};
use crate::error::LedgerError;

/// Column list selected for every [`LoanRow`].
pub const LOAN_COLUMNS: &str = "id, loan_code, worker_id, principal, balance, interest_rate, \
     purpose, notes, status, disbursed_at, due_date, created_by_id, created_at, updated_at";

/// Column list selected for every [`PaymentRow`].
pub const PAYMENT_COLUMNS: &str = "id, payment_code, loan_id, amount, method, reference, notes, \
     paid_at, recorded_by_id, created_at";

/// A row from the `loans` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoanRow {
    /// Primary key.
    pub id: Uuid,
    /// `L-YYYYMM-NNNN`.
    pub loan_code: String,
    /// Borrowing worker.
    pub worker_id: Uuid,
    /// `NUMERIC(14,2)`.
    pub principal: Decimal,
    /// `NUMERIC(14,2)`, checked against principal.
    pub balance: Decimal,
    /// `NUMERIC(7,4)`.
    pub interest_rate: Decimal,
    /// Free text.
    pub purpose: Option<String>,
    /// Free text.
    pub notes: Option<String>,
    /// Stored status, never `OVERDUE`.
    pub status: String,
    /// Disbursement time.
    pub disbursed_at: DateTime<Utc>,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Issuing user.
    pub created_by_id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = LedgerError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            code: LoanCode::parse(&row.loan_code).map_err(corrupt)?,
            worker_id: row.worker_id.into(),
            principal: row.principal,
            balance: row.balance,
            interest_rate: row.interest_rate,
            purpose: row.purpose,
            notes: row.notes,
            status: row.status.parse().map_err(corrupt)?,
            disbursed_at: row.disbursed_at,
            due_date: row.due_date,
            created_by_id: row.created_by_id.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `payments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    /// Primary key.
    pub id: Uuid,
    /// `P-YYYYMMDD-NNNN`.
    pub payment_code: String,
    /// Owning loan.
    pub loan_id: Uuid,
    /// `NUMERIC(14,2)`, positive.
    pub amount: Decimal,
    /// Payment method name.
    pub method: String,
    /// External reference.
    pub reference: Option<String>,
    /// Free text.
    pub notes: Option<String>,
    /// When the worker paid.
    pub paid_at: DateTime<Utc>,
    /// Recording user.
    pub recorded_by_id: Uuid,
    /// Recording time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            code: PaymentCode::parse(&row.payment_code).map_err(corrupt)?,
            loan_id: row.loan_id.into(),
            amount: row.amount,
            method: row.method.parse().map_err(corrupt)?,
            reference: row.reference,
            notes: row.notes,
            paid_at: row.paid_at,
            recorded_by_id: row.recorded_by_id.into(),
            created_at: row.created_at,
        })
    }
}

fn corrupt(err: LedgerError) -> LedgerError {
    LedgerError::Internal(format!("corrupt row: {err}"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{LoanStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn loan_row(status: &str) -> LoanRow {
        let now = Utc::now();
        LoanRow {
            id: Uuid::new_v4(),
            loan_code: "L-202604-0012".to_string(),
            worker_id: Uuid::new_v4(),
            principal: dec!(1000.00),
            balance: dec!(250.00),
            interest_rate: dec!(0),
            purpose: Some("rent".to_string()),
            notes: None,
            status: status.to_string(),
            disbursed_at: now,
            due_date: None,
            created_by_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn loan_row_converts() {
        let Ok(loan) = Loan::try_from(loan_row("ACTIVE")) else {
            panic!("valid row");
        };
        assert_eq!(loan.code.as_str(), "L-202604-0012");
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.amount_paid(), dec!(750));
    }

    #[test]
    fn unknown_status_is_internal() {
        assert!(matches!(
            Loan::try_from(loan_row("FROZEN")),
            Err(LedgerError::Internal(_))
        ));
    }

    #[test]
    fn payment_row_converts() {
        let now = Utc::now();
        let row = PaymentRow {
            id: Uuid::new_v4(),
            payment_code: "P-20260401-0003".to_string(),
            loan_id: Uuid::new_v4(),
            amount: dec!(50.25),
            method: "BANK_TRANSFER".to_string(),
            reference: Some("TX-1".to_string()),
            notes: None,
            paid_at: now,
            recorded_by_id: Uuid::new_v4(),
            created_at: now,
        };
        let Ok(payment) = Payment::try_from(row) else {
            panic!("valid row");
        };
        assert_eq!(payment.method, PaymentMethod::BankTransfer);
        assert_eq!(payment.code.sequence(), 3);
    }
}
