//! Volta Ledger
//!
//! Single-node token ledger with a hash-linked audit chain.
//!
//! # Architecture
//!
//! - **Single Writer**: one write lock serializes every mutating operation
//! - **Write Sets**: each operation commits as one RocksDB batch or not at all
//! - **Snapshot Reads**: history and chain listings never see half-applied writes
//! - **Hash Chain**: every committed operation appends a record linked to its predecessor
//!
//! # Invariants
//!
//! - Transfers conserve the sum of balances; only loans change it
//! - No transfer drives the sender negative
//! - No transfer from an address with an active loan
//! - `record[0].previous_hash == "0"`, `record[i].previous_hash == record[i-1].hash`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod address;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod loans;
pub mod metrics;
pub mod recorder;
pub mod service;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use ledger::Ledger;
pub use service::LedgerService;
pub use storage::Storage;
pub use types::{
    Account, Address, ChainRecord, ChainReport, GenesisBlock, Loan, LoanReceipt, LoanStatus,
    Transaction, TransactionView, TransferReceipt, LOAN_SYSTEM,
};
