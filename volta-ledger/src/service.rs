//! Transport-agnostic service surface
//!
//! Request and response shapes for the six client operations, with errors
//! reduced to a machine-readable kind plus message. A transport (gRPC, HTTP)
//! only has to map its wire messages onto these types.

use crate::{
    error::ErrorKind,
    types::{Address, TransactionView},
    Error, Ledger,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Result type for service calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Newly created account credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAddress {
    /// New address
    pub address: Address,
    /// Opening balance (zero)
    pub balance: Decimal,
    /// Identity token
    pub identity: String,
    /// Passkey authorizing transfers from this address
    pub passkey: String,
}

/// Transfer request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTokensRequest {
    /// Sender
    pub from: Address,
    /// Receiver
    pub to: Address,
    /// Amount to move
    pub amount: Decimal,
    /// Sender's passkey
    pub passkey: String,
}

/// Committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// Sender
    pub from: Address,
    /// Receiver
    pub to: Address,
    /// Amount moved
    pub amount: Decimal,
    /// Transaction digest
    pub tx_hash: String,
    /// Sender balance after the transfer
    pub new_sender_balance: Decimal,
}

/// Balance of one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Queried address
    pub address: Address,
    /// Committed balance
    pub balance: Decimal,
}

/// History of one address, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistoryResponse {
    /// Transactions sent or received
    pub transactions: Vec<TransactionView>,
}

/// Loan request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
    /// Borrower
    pub address: Address,
    /// Amount to borrow
    pub amount: Decimal,
    /// Stated reason
    pub reason: String,
}

/// Loan repayment request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayBackRequest {
    /// Borrower
    pub address: Address,
    /// Amount repaid
    pub amount: Decimal,
}

/// Outcome of a loan issuance or repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResponse {
    /// Human-readable outcome
    pub message: String,
    /// Balance before the operation
    pub previous_balance: Decimal,
    /// Balance after the operation
    pub updated_balance: Decimal,
    /// Synthetic transaction digest
    pub tx_hash: String,
}

/// Error returned to service callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Machine-readable kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

impl ServiceError {
    /// JSON error body
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.message,
            }
        })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Service facade over a shared ledger
#[derive(Debug, Clone)]
pub struct LedgerService {
    ledger: Arc<Ledger>,
}

impl LedgerService {
    /// Wrap a shared ledger
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Create an account with a zero balance
    pub fn create_address(&self) -> ServiceResult<UserAddress> {
        let account = self.ledger.create_account()?;
        Ok(UserAddress {
            address: account.address,
            balance: account.balance,
            identity: account.identity,
            passkey: account.passkey,
        })
    }

    /// Transfer tokens between two accounts
    pub fn send_tokens(&self, request: SendTokensRequest) -> ServiceResult<TransactionResponse> {
        let receipt = self.ledger.transfer(
            &request.from,
            &request.to,
            request.amount,
            &request.passkey,
        )?;
        Ok(TransactionResponse {
            from: receipt.from,
            to: receipt.to,
            amount: receipt.amount,
            tx_hash: receipt.tx_hash,
            new_sender_balance: receipt.new_sender_balance,
        })
    }

    /// Committed balance of an address
    pub fn check_balance(&self, address: &Address) -> ServiceResult<BalanceResponse> {
        let balance = self.ledger.balance(address)?;
        Ok(BalanceResponse {
            address: address.clone(),
            balance,
        })
    }

    /// History of an address, oldest first; an empty history is `NotFound`
    pub fn check_transactions(
        &self,
        address: &Address,
    ) -> ServiceResult<TransactionHistoryResponse> {
        Ok(TransactionHistoryResponse {
            transactions: self.ledger.transactions(address)?,
        })
    }

    /// Issue a loan
    pub fn request_loan(&self, request: LoanRequest) -> ServiceResult<LoanResponse> {
        let receipt =
            self.ledger
                .request_loan(&request.address, request.amount, &request.reason)?;
        Ok(LoanResponse {
            message: receipt.message,
            previous_balance: receipt.previous_balance,
            updated_balance: receipt.updated_balance,
            tx_hash: receipt.tx_hash,
        })
    }

    /// Repay the active loan
    pub fn pay_back_loan(&self, request: PayBackRequest) -> ServiceResult<LoanResponse> {
        let receipt = self.ledger.repay_loan(&request.address, request.amount)?;
        Ok(LoanResponse {
            message: receipt.message,
            previous_balance: receipt.previous_balance,
            updated_balance: receipt.updated_balance,
            tx_hash: receipt.tx_hash,
        })
    }
}
