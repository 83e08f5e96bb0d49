//! Loan subsystem
//!
//! Per-address state machine `none → active → paid`, at most one active loan
//! per address. Issuance and repayment each stage the loan row, the balance
//! change and a synthetic transaction against the `LOAN_SYSTEM` pool.

use crate::{
    accounts::AccountLedger,
    recorder::TransactionRecorder,
    storage::{Storage, WriteSet, SEQ_LOAN},
    types::{Address, Loan, LoanStatus, Transaction},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Staged outcome of a loan operation
#[derive(Debug, Clone)]
pub struct LoanMovement {
    /// Loan row after the operation
    pub loan: Loan,
    /// Balance before the operation
    pub previous_balance: Decimal,
    /// Balance after the operation
    pub updated_balance: Decimal,
    /// Synthetic transaction
    pub transaction: Transaction,
}

/// Loan book over the shared storage handle
#[derive(Debug, Clone)]
pub struct LoanBook {
    storage: Arc<Storage>,
    accounts: AccountLedger,
    recorder: TransactionRecorder,
}

impl LoanBook {
    /// Create loan book
    pub fn new(
        storage: Arc<Storage>,
        accounts: AccountLedger,
        recorder: TransactionRecorder,
    ) -> Self {
        Self {
            storage,
            accounts,
            recorder,
        }
    }

    /// Refuse with `LoanActive` when `address` holds an active loan
    pub fn ensure_no_active_loan(&self, ws: &WriteSet<'_>, address: &Address) -> Result<()> {
        if ws.active_loan(address)?.is_some() {
            return Err(Error::LoanActive(address.to_string()));
        }
        Ok(())
    }

    /// Stage `none|paid → active`: credit, loan row, `LOAN_SYSTEM → address` transaction
    pub fn issue(
        &self,
        ws: &mut WriteSet<'_>,
        address: &Address,
        amount: Decimal,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<LoanMovement> {
        let account = self.accounts.resolve(ws, address)?;
        self.ensure_no_active_loan(ws, address)?;
        let updated_balance = self.accounts.credit(ws, address, amount)?;

        let loan = Loan {
            id: ws.next_id(SEQ_LOAN)?,
            address: address.clone(),
            amount,
            reason: reason.to_string(),
            status: LoanStatus::Active,
            created_at: at,
            settled_at: None,
        };
        ws.put_loan(loan.clone())?;

        let transaction = self.recorder.record(ws, &Address::loan_pool(), address, amount, at)?;

        Ok(LoanMovement {
            loan,
            previous_balance: account.balance,
            updated_balance,
            transaction,
        })
    }

    /// Stage `active → paid`: status change, debit, `address → LOAN_SYSTEM` transaction
    ///
    /// The amount is not compared with the loan amount or the balance; the
    /// balance may go negative.
    pub fn repay(
        &self,
        ws: &mut WriteSet<'_>,
        address: &Address,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<LoanMovement> {
        let mut loan = ws
            .active_loan(address)?
            .ok_or_else(|| Error::NoActiveLoan(address.to_string()))?;
        let account = self.accounts.resolve(ws, address)?;

        loan.status = LoanStatus::Paid;
        loan.settled_at = Some(at);
        ws.put_loan(loan.clone())?;

        let updated_balance = self.accounts.charge(ws, address, amount)?;
        let transaction = self.recorder.record(ws, address, &Address::loan_pool(), amount, at)?;

        Ok(LoanMovement {
            loan,
            previous_balance: account.balance,
            updated_balance,
            transaction,
        })
    }

    /// Committed active loan of `address`
    pub fn active_loan(&self, address: &Address) -> Result<Option<Loan>> {
        self.storage.active_loan(address)
    }

    /// Committed loans of `address`, oldest first
    pub fn loans(&self, address: &Address) -> Result<Vec<Loan>> {
        self.storage.loans_for(address)
    }
}
