//! Error types for the ledger

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Address does not belong to any account
    #[error("Invalid address: {0}")]
    UnknownAddress(String),

    /// Passkey did not match the sender's stored passkey
    #[error("Invalid passkey for {0}")]
    AuthFailed(String),

    /// Balance lower than the requested amount
    #[error("Insufficient balance on {address}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account being debited
        address: String,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Sender holds an active loan
    #[error("Loan tokens cannot be withdrawn while a loan is active on {0}")]
    LoanActive(String),

    /// Repayment without an active loan
    #[error("No active loan found for {0}")]
    NoActiveLoan(String),

    /// Lookup returned nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Amount is zero or negative
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Balance change would leave the representable decimal range
    #[error("Balance overflow on {address}: balance {balance}, change {amount}")]
    BalanceOverflow {
        /// Account being changed
        address: String,
        /// Balance before the change
        balance: Decimal,
        /// Requested change
        amount: Decimal,
    },

    /// Sum of balances does not fit a decimal
    #[error("Total supply overflows after {0} accounts")]
    SupplyOverflow(usize),

    /// Chain log failed verification
    #[error("Chain integrity violation at record {id}: expected {expected}, found {actual}")]
    ChainIntegrity {
        /// Offending record id
        id: u64,
        /// Expected value
        expected: String,
        /// Stored value
        actual: String,
    },

    /// Storage error (RocksDB, key constraints)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Row serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Canonical payload serialization error
    #[error("Payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownAddress(_) => ErrorKind::UnknownAddress,
            Error::AuthFailed(_) => ErrorKind::AuthFailed,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::LoanActive(_) => ErrorKind::LoanActive,
            Error::NoActiveLoan(_) => ErrorKind::NoActiveLoan,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidAmount(_) | Error::BalanceOverflow { .. } => ErrorKind::InvalidAmount,
            Error::Storage(_) | Error::Serialization(_) | Error::Payload(_) | Error::Io(_) => {
                ErrorKind::StorageFailure
            }
            Error::ChainIntegrity { .. }
            | Error::SupplyOverflow(_)
            | Error::Metrics(_)
            | Error::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Error taxonomy surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown account address
    UnknownAddress,
    /// Passkey mismatch
    AuthFailed,
    /// Not enough balance
    InsufficientFunds,
    /// Active loan blocks withdrawal
    LoanActive,
    /// No loan to repay
    NoActiveLoan,
    /// Empty lookup result
    NotFound,
    /// Non-positive amount
    InvalidAmount,
    /// Persistence failure; the operation was rolled back
    StorageFailure,
    /// Configuration or integrity failure
    Internal,
}

impl ErrorKind {
    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownAddress => "unknown_address",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::LoanActive => "loan_active",
            ErrorKind::NoActiveLoan => "no_active_loan",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
