//! Core types for the ledger
//!
//! All row types are designed for:
//! - Deterministic serialization (bincode for rows, JSON for hashed payloads)
//! - Exact arithmetic (Decimal for balances and amounts)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel counterparty for loan issuance and repayment
pub const LOAN_SYSTEM: &str = "LOAN_SYSTEM";

/// Previous hash carried by the genesis record
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Text format of transaction dates, shared by hashing and history reads
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Account address (`VTA…` admin, `VT…` user) or the loan pool sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Wrap an address string
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The loan pool sentinel
    pub fn loan_pool() -> Self {
        Self(LOAN_SYSTEM.to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Administrative address
    pub fn is_admin(&self) -> bool {
        self.0.starts_with(crate::address::ADMIN_PREFIX)
    }

    /// Loan pool sentinel rather than a real account
    pub fn is_loan_pool(&self) -> bool {
        self.0 == LOAN_SYSTEM
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Account row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique address
    pub address: Address,

    /// Shared-secret credential
    pub passkey: String,

    /// Opaque identity token (UUID v4)
    pub identity: String,

    /// Current balance
    pub balance: Decimal,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Check a presented passkey
    pub fn passkey_matches(&self, passkey: &str) -> bool {
        self.passkey == passkey
    }
}

/// Committed transaction row, keyed by its content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// SHA-256 hex digest of the canonical payload
    pub hash: String,

    /// Sender (or loan pool)
    pub from: Address,

    /// Receiver (or loan pool)
    pub to: Address,

    /// Amount moved
    pub amount: Decimal,

    /// Time the transaction took effect
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    /// Date text as hashed and as returned by history reads
    pub fn date(&self) -> String {
        self.occurred_at.format(DATE_FORMAT).to_string()
    }

    /// History view of this transaction
    pub fn view(&self) -> TransactionView {
        TransactionView {
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            date: self.date(),
        }
    }
}

/// Canonical payload hashed into the transaction digest
///
/// Field order is fixed by declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPayload<'a> {
    /// Sender
    pub from: &'a str,
    /// Receiver
    pub to: &'a str,
    /// Amount, serialized as an exact decimal string
    pub amount: Decimal,
    /// Date text in [`DATE_FORMAT`]
    pub date: String,
}

/// Transaction as returned by history reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    /// Sender
    pub from: Address,
    /// Receiver
    pub to: Address,
    /// Amount
    pub amount: Decimal,
    /// Date text
    pub date: String,
}

/// Hash-linked chain record ("block")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Sequential id, starting at 1
    pub id: u64,

    /// Time of the operation the record seals
    pub timestamp: DateTime<Utc>,

    /// Digest of the triggering payload
    pub hash: String,

    /// Hash of the record inserted immediately before
    pub previous_hash: String,

    /// Account the record is bound to
    pub owner: Option<Address>,

    /// Insertion time
    pub created_at: DateTime<Utc>,
}

impl ChainRecord {
    /// Genesis records link to the `"0"` sentinel
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Genesis payload, hashed into the first chain record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisBlock {
    /// Genesis token label
    #[serde(rename = "Genesis Token")]
    pub genesis_token: String,

    /// Creation timestamp text
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    /// Creation date (ISO 8601)
    #[serde(rename = "Date")]
    pub date: String,

    /// Author
    #[serde(rename = "Author")]
    pub author: String,

    /// Token name
    #[serde(rename = "TokenName")]
    pub token_name: String,

    /// Token currency
    #[serde(rename = "TokenCurrency")]
    pub token_currency: String,

    /// Initial supply credited to the admin
    #[serde(rename = "TokenSupply")]
    pub token_supply: Decimal,

    /// Admin address
    #[serde(rename = "Address")]
    pub address: Address,
}

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoanStatus {
    /// Outstanding; blocks transfers from the borrower
    Active = 1,
    /// Repaid (terminal)
    Paid = 2,
}

impl LoanStatus {
    /// Status label
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    /// Sequential id
    pub id: u64,

    /// Borrower
    pub address: Address,

    /// Issued amount
    pub amount: Decimal,

    /// Stated reason
    pub reason: String,

    /// Current status
    pub status: LoanStatus,

    /// Issue time
    pub created_at: DateTime<Utc>,

    /// Repayment time
    pub settled_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// Loan still outstanding
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transaction digest
    pub tx_hash: String,
    /// Sender
    pub from: Address,
    /// Receiver
    pub to: Address,
    /// Amount moved
    pub amount: Decimal,
    /// Sender balance after the transfer
    pub new_sender_balance: Decimal,
    /// Chain record sealing the transfer
    pub block_id: u64,
}

/// Result of a committed loan issuance or repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanReceipt {
    /// Loan affected
    pub loan_id: u64,
    /// Human-readable outcome
    pub message: String,
    /// Balance before the operation
    pub previous_balance: Decimal,
    /// Balance after the operation
    pub updated_balance: Decimal,
    /// Synthetic transaction digest
    pub tx_hash: String,
}

/// Outcome of a full chain walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    /// Number of records
    pub height: u64,
    /// Genesis hash, if any
    pub genesis_hash: Option<String>,
    /// Hash of the newest record, if any
    pub head_hash: Option<String>,
}
