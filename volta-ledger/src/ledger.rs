//! Main ledger orchestration layer
//!
//! This module ties together storage, accounts, the transaction recorder, the
//! loan book and the chain log into the operation set callers use.
//!
//! Every mutating operation runs under one write lock and stages all of its
//! effects in a single write set, so the balance changes, the transaction row
//! and the chain record of an operation commit together or not at all.
//!
//! # Example
//!
//! ```no_run
//! use volta_ledger::{Address, Config, Ledger};
//! use rust_decimal::Decimal;
//!
//! fn main() -> volta_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let alice = ledger.create_account()?;
//!     let Some(admin) = ledger.admin_address()? else { return Ok(()) };
//!     let passkey = ledger.account(&admin)?.passkey;
//!
//!     let receipt = ledger.transfer(&admin, &alice.address, Decimal::from(100), &passkey)?;
//!     println!("tx {} sealed in block {}", receipt.tx_hash, receipt.block_id);
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::{ensure_funds, AccountLedger},
    address::AddressGenerator,
    chain::ChainLog,
    loans::{LoanBook, LoanMovement},
    metrics::Metrics,
    recorder::TransactionRecorder,
    storage::{Storage, StorageStats, WriteSet},
    types::{
        Account, Address, ChainRecord, ChainReport, GenesisBlock, Loan, LoanReceipt,
        TransactionView, TransferReceipt,
    },
    Config, Error, Result,
};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Message returned when a loan is issued
pub const LOAN_REQUESTED: &str = "Loan requested successfully";

/// Message returned when a loan is repaid
pub const LOAN_REPAID: &str = "Loan paid back successfully";

/// State created by the first start on an empty chain
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Admin account holding the initial supply
    pub admin: Account,
    /// Genesis payload
    pub genesis: GenesisBlock,
    /// Genesis chain record
    pub record: ChainRecord,
}

/// Main ledger interface
pub struct Ledger {
    storage: Arc<Storage>,
    accounts: AccountLedger,
    recorder: TransactionRecorder,
    loans: LoanBook,
    chain: ChainLog,

    /// Serializes writers; readers use storage snapshots
    write_lock: Mutex<()>,

    metrics: Metrics,
    config: Config,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("storage", &self.storage)
            .field("service_name", &self.config.service_name)
            .finish()
    }
}

impl Ledger {
    /// Open ledger with configuration, bootstrapping an empty chain
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        Self::with_storage(storage, config)
    }

    /// Build a ledger over an already opened storage handle
    pub fn with_storage(storage: Arc<Storage>, config: Config) -> Result<Self> {
        let generator = AddressGenerator::new(config.token.admin_passkey_seed.clone());
        let accounts = AccountLedger::new(storage.clone(), generator);
        let recorder = TransactionRecorder::new(storage.clone());
        let loans = LoanBook::new(storage.clone(), accounts.clone(), recorder.clone());
        let chain = ChainLog::new(storage.clone());

        let ledger = Self {
            storage,
            accounts,
            recorder,
            loans,
            chain,
            write_lock: Mutex::new(()),
            metrics: Metrics::new()?,
            config,
        };

        ledger.bootstrap()?;
        if let Some(head) = ledger.chain.head()? {
            ledger.metrics.set_chain_height(head.id);
        }

        Ok(ledger)
    }

    /// Create the admin account and genesis record if the chain is empty
    ///
    /// Returns `None` when the chain already exists; existing state is left untouched.
    pub fn bootstrap(&self) -> Result<Option<Bootstrap>> {
        let _guard = self.write_lock.lock();

        if let Some(head) = self.chain.head()? {
            tracing::info!(height = head.id, "Chain already initialized");
            return Ok(None);
        }

        let now = Utc::now();
        let token = &self.config.token;
        let mut ws = self.storage.write_set();

        let admin = self
            .accounts
            .create_admin_account(&mut ws, token.initial_supply)?;

        let genesis = GenesisBlock {
            genesis_token: token.genesis_token.clone(),
            timestamp: now.format(crate::types::DATE_FORMAT).to_string(),
            date: now.date_naive().to_string(),
            author: token.author.clone(),
            token_name: token.name.clone(),
            token_currency: token.currency.clone(),
            token_supply: token.initial_supply,
            address: admin.address.clone(),
        };
        let record = self.chain.append_genesis(&mut ws, &genesis, now)?;

        self.commit(ws)?;
        self.metrics.accounts_created.inc();
        self.metrics.set_chain_height(record.id);

        tracing::info!(
            admin = %admin.address,
            genesis_hash = %record.hash,
            supply = %token.initial_supply,
            "Chain initialized"
        );

        Ok(Some(Bootstrap {
            admin,
            genesis,
            record,
        }))
    }

    /// Create an ordinary account with a zero balance
    pub fn create_account(&self) -> Result<Account> {
        self.observe("create_account", self.create_account_inner())
    }

    fn create_account_inner(&self) -> Result<Account> {
        let _guard = self.write_lock.lock();
        let mut ws = self.storage.write_set();
        let account = self.accounts.create_account(&mut ws)?;
        self.commit(ws)?;

        self.metrics.accounts_created.inc();
        tracing::info!(address = %account.address, "Account created");
        Ok(account)
    }

    /// Move `amount` from `from` to `to`, authorized by the sender's passkey
    ///
    /// Checks run in order: amount, both addresses, passkey, funds, loan gate.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Decimal,
        passkey: &str,
    ) -> Result<TransferReceipt> {
        self.observe("transfer", self.transfer_inner(from, to, amount, passkey))
    }

    fn transfer_inner(
        &self,
        from: &Address,
        to: &Address,
        amount: Decimal,
        passkey: &str,
    ) -> Result<TransferReceipt> {
        ensure_positive(amount)?;

        let _guard = self.write_lock.lock();
        let mut ws = self.storage.write_set();

        let sender = self.accounts.resolve(&ws, from)?;
        self.accounts.resolve(&ws, to)?;

        if !sender.passkey_matches(passkey) {
            return Err(Error::AuthFailed(from.to_string()));
        }
        ensure_funds(&sender, amount)?;
        self.loans.ensure_no_active_loan(&ws, from)?;

        let now = Utc::now();
        self.accounts.debit(&mut ws, from, amount)?;
        self.accounts.credit(&mut ws, to, amount)?;
        let new_sender_balance = self.accounts.resolve(&ws, from)?.balance;

        let transaction = self.recorder.record(&mut ws, from, to, amount, now)?;
        let record = self
            .chain
            .append(&mut ws, &transaction.hash, Some(from), now)?;

        self.commit(ws)?;
        self.metrics.transfers_total.inc();
        self.metrics.set_chain_height(record.id);

        tracing::info!(
            tx_hash = %transaction.hash,
            from = %from,
            to = %to,
            amount = %amount,
            block_id = record.id,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            tx_hash: transaction.hash,
            from: from.clone(),
            to: to.clone(),
            amount,
            new_sender_balance,
            block_id: record.id,
        })
    }

    /// Committed balance of `address`
    pub fn balance(&self, address: &Address) -> Result<Decimal> {
        self.observe("balance", self.accounts.get_balance(address))
    }

    /// Transactions sent or received by `address`, oldest first
    ///
    /// An empty history is reported as `NotFound`.
    pub fn transactions(&self, address: &Address) -> Result<Vec<TransactionView>> {
        self.observe("transactions", self.transactions_inner(address))
    }

    fn transactions_inner(&self, address: &Address) -> Result<Vec<TransactionView>> {
        let history = self.recorder.history(address)?;
        if history.is_empty() {
            return Err(Error::NotFound(format!("No transactions found for {}", address)));
        }
        Ok(history.iter().map(|tx| tx.view()).collect())
    }

    /// Issue a loan of `amount` to `address`
    pub fn request_loan(
        &self,
        address: &Address,
        amount: Decimal,
        reason: &str,
    ) -> Result<LoanReceipt> {
        self.observe("request_loan", self.request_loan_inner(address, amount, reason))
    }

    fn request_loan_inner(
        &self,
        address: &Address,
        amount: Decimal,
        reason: &str,
    ) -> Result<LoanReceipt> {
        ensure_positive(amount)?;

        let _guard = self.write_lock.lock();
        let mut ws = self.storage.write_set();
        let now = Utc::now();

        let movement = self.loans.issue(&mut ws, address, amount, reason, now)?;
        let receipt = self.seal_loan(ws, address, movement, LOAN_REQUESTED)?;
        self.metrics.loans_issued.inc();

        tracing::info!(
            address = %address,
            loan_id = receipt.loan_id,
            amount = %amount,
            tx_hash = %receipt.tx_hash,
            "Loan issued"
        );
        Ok(receipt)
    }

    /// Repay the active loan of `address` with `amount`
    pub fn repay_loan(&self, address: &Address, amount: Decimal) -> Result<LoanReceipt> {
        self.observe("repay_loan", self.repay_loan_inner(address, amount))
    }

    fn repay_loan_inner(&self, address: &Address, amount: Decimal) -> Result<LoanReceipt> {
        ensure_positive(amount)?;

        let _guard = self.write_lock.lock();
        let mut ws = self.storage.write_set();
        let now = Utc::now();

        let movement = self.loans.repay(&mut ws, address, amount, now)?;
        let receipt = self.seal_loan(ws, address, movement, LOAN_REPAID)?;
        self.metrics.loans_repaid.inc();

        if receipt.updated_balance < Decimal::ZERO {
            tracing::warn!(
                address = %address,
                balance = %receipt.updated_balance,
                "Loan repayment left a negative balance"
            );
        }
        tracing::info!(
            address = %address,
            loan_id = receipt.loan_id,
            amount = %amount,
            tx_hash = %receipt.tx_hash,
            "Loan repaid"
        );
        Ok(receipt)
    }

    /// Append the chain record for a staged loan movement and commit
    fn seal_loan(
        &self,
        mut ws: WriteSet<'_>,
        address: &Address,
        movement: LoanMovement,
        message: &str,
    ) -> Result<LoanReceipt> {
        let record = self.chain.append(
            &mut ws,
            &movement.transaction.hash,
            Some(address),
            movement.transaction.occurred_at,
        )?;
        self.commit(ws)?;
        self.metrics.set_chain_height(record.id);

        Ok(LoanReceipt {
            loan_id: movement.loan.id,
            message: message.to_string(),
            previous_balance: movement.previous_balance,
            updated_balance: movement.updated_balance,
            tx_hash: movement.transaction.hash,
        })
    }

    /// Committed account row
    pub fn account(&self, address: &Address) -> Result<Account> {
        self.accounts.get(address)
    }

    /// True iff `address` holds an active loan
    pub fn is_loan_active(&self, address: &Address) -> Result<bool> {
        self.accounts.is_loan_active(address)
    }

    /// Active loan of `address`
    pub fn active_loan(&self, address: &Address) -> Result<Option<Loan>> {
        self.loans.active_loan(address)
    }

    /// Every loan of `address`, oldest first
    pub fn loans(&self, address: &Address) -> Result<Vec<Loan>> {
        self.loans.loans(address)
    }

    /// All chain records in id order
    pub fn chain(&self) -> Result<Vec<ChainRecord>> {
        self.chain.records()
    }

    /// Newest chain record
    pub fn chain_head(&self) -> Result<Option<ChainRecord>> {
        self.chain.head()
    }

    /// Chain record by id
    pub fn block(&self, id: u64) -> Result<Option<ChainRecord>> {
        self.chain.get(id)
    }

    /// Walk the chain: ids, links, genesis digest and every transaction digest
    pub fn verify_chain(&self) -> Result<ChainReport> {
        let recorder = &self.recorder;
        self.chain.verify(|record| match recorder.get(&record.hash)? {
            Some(transaction) => TransactionRecorder::verify(&transaction),
            None => Ok(false),
        })
    }

    /// Genesis payload
    pub fn genesis(&self) -> Result<Option<GenesisBlock>> {
        self.chain.genesis()
    }

    /// Address of the bootstrap admin
    pub fn admin_address(&self) -> Result<Option<Address>> {
        self.chain.admin_address()
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> Result<Decimal> {
        self.accounts.total_balance()
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn commit(&self, ws: WriteSet<'_>) -> Result<()> {
        let start = Instant::now();
        ws.commit()?;
        self.metrics
            .record_commit_duration(start.elapsed().as_secs_f64());
        Ok(())
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.metrics.record_rejection(err.kind());
            tracing::warn!(operation, kind = %err.kind(), error = %err, "Operation rejected");
        }
        result
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_hex;
    use crate::types::{LoanStatus, LOAN_SYSTEM};
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Ledger::open(config).unwrap(), temp_dir)
    }

    fn admin(ledger: &Ledger) -> (Address, String) {
        let address = ledger.admin_address().unwrap().unwrap();
        (address, sha256_hex("passkey"))
    }

    #[test]
    fn test_open_bootstraps_genesis() {
        let (ledger, _temp) = create_test_ledger();

        let chain = ledger.chain().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].previous_hash, "0");

        let (admin, _) = admin(&ledger);
        assert!(admin.is_admin());
        assert_eq!(chain[0].owner, Some(admin.clone()));
        assert_eq!(
            ledger.balance(&admin).unwrap(),
            Decimal::from(10_000_000_000_000_000_000u64)
        );

        let genesis = ledger.genesis().unwrap().unwrap();
        assert_eq!(genesis.token_currency, "VOLTGX");
        assert_eq!(genesis.address, admin);
        assert_eq!(ledger.metrics().chain_height.get(), 1);
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let (ledger, _temp) = create_test_ledger();
        assert!(ledger.bootstrap().unwrap().is_none());
        assert_eq!(ledger.chain().unwrap().len(), 1);
        assert_eq!(ledger.stats().unwrap().total_accounts, 1);
    }

    #[test]
    fn test_transfer_moves_balance_and_links_chain() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, passkey) = admin(&ledger);
        let user = ledger.create_account().unwrap();
        let head_before = ledger.chain_head().unwrap().unwrap();

        let receipt = ledger
            .transfer(&admin, &user.address, Decimal::from(100), &passkey)
            .unwrap();

        assert_eq!(ledger.balance(&user.address).unwrap(), Decimal::from(100));
        assert_eq!(
            receipt.new_sender_balance,
            Decimal::from(10_000_000_000_000_000_000u64) - Decimal::from(100)
        );

        let head = ledger.chain_head().unwrap().unwrap();
        assert_eq!(head.id, receipt.block_id);
        assert_eq!(head.hash, receipt.tx_hash);
        assert_eq!(head.previous_hash, head_before.hash);
        assert_eq!(head.owner, Some(admin));
        assert_eq!(ledger.metrics().transfers_total.get(), 1);
    }

    #[test]
    fn test_transfer_error_precedence() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, passkey) = admin(&ledger);
        let user = ledger.create_account().unwrap();
        let ghost = Address::new("VTghost");

        // Unknown address wins over a bad passkey
        let err = ledger
            .transfer(&admin, &ghost, Decimal::from(1), "wrong")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAddress);

        // Bad passkey wins over insufficient funds
        let err = ledger
            .transfer(&user.address, &admin, Decimal::from(1), "wrong")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);

        // Insufficient funds wins over the loan gate
        ledger
            .request_loan(&user.address, Decimal::from(5), "tools")
            .unwrap();
        let err = ledger
            .transfer(&user.address, &admin, Decimal::from(50), &user.passkey)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

        let err = ledger
            .transfer(&user.address, &admin, Decimal::from(1), &user.passkey)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoanActive);

        let err = ledger
            .transfer(&admin, &user.address, Decimal::ZERO, &passkey)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);

        assert_eq!(ledger.metrics().rejections(ErrorKind::LoanActive), 1);
    }

    #[test]
    fn test_rejected_transfer_leaves_no_trace() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, _) = admin(&ledger);
        let user = ledger.create_account().unwrap();
        let stats_before = ledger.stats().unwrap();

        assert!(ledger
            .transfer(&user.address, &admin, Decimal::from(10), &user.passkey)
            .is_err());

        assert_eq!(ledger.stats().unwrap(), stats_before);
        assert_eq!(ledger.balance(&user.address).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, passkey) = admin(&ledger);
        let before = ledger.balance(&admin).unwrap();

        let receipt = ledger
            .transfer(&admin, &admin, Decimal::from(10), &passkey)
            .unwrap();

        assert_eq!(receipt.new_sender_balance, before);
        assert_eq!(ledger.balance(&admin).unwrap(), before);
    }

    #[test]
    fn test_loan_lifecycle() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, _) = admin(&ledger);
        let user = ledger.create_account().unwrap();

        let issued = ledger
            .request_loan(&user.address, Decimal::from(500), "equipment")
            .unwrap();
        assert_eq!(issued.message, LOAN_REQUESTED);
        assert_eq!(issued.previous_balance, Decimal::ZERO);
        assert_eq!(issued.updated_balance, Decimal::from(500));
        assert!(ledger.is_loan_active(&user.address).unwrap());

        let err = ledger
            .request_loan(&user.address, Decimal::from(1), "again")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoanActive);

        let repaid = ledger.repay_loan(&user.address, Decimal::from(500)).unwrap();
        assert_eq!(repaid.message, LOAN_REPAID);
        assert_eq!(repaid.loan_id, issued.loan_id);
        assert_eq!(repaid.updated_balance, Decimal::ZERO);
        assert_eq!(ledger.loans(&user.address).unwrap()[0].status, LoanStatus::Paid);

        let err = ledger
            .repay_loan(&user.address, Decimal::from(500))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveLoan);

        let history = ledger.transactions(&user.address).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from.as_str(), LOAN_SYSTEM);
        assert_eq!(history[1].to.as_str(), LOAN_SYSTEM);
        assert!(ledger.transactions(&admin).is_err());
    }

    #[test]
    fn test_loan_past_decimal_range_rejected() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, _) = admin(&ledger);
        let balance = ledger.balance(&admin).unwrap();
        let height = ledger.chain().unwrap().len();

        let err = ledger
            .request_loan(&admin, Decimal::MAX, "everything")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert_eq!(ledger.balance(&admin).unwrap(), balance);
        assert!(!ledger.is_loan_active(&admin).unwrap());
        assert!(ledger.loans(&admin).unwrap().is_empty());
        assert_eq!(ledger.chain().unwrap().len(), height);
    }

    #[test]
    fn test_transfer_credit_overflow_rejected() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, passkey) = admin(&ledger);
        let user = ledger.create_account().unwrap();
        ledger
            .request_loan(&user.address, Decimal::MAX, "max")
            .unwrap();
        let admin_balance = ledger.balance(&admin).unwrap();

        let err = ledger
            .transfer(&admin, &user.address, Decimal::ONE, &passkey)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert_eq!(ledger.balance(&admin).unwrap(), admin_balance);
        assert_eq!(ledger.balance(&user.address).unwrap(), Decimal::MAX);
    }

    #[test]
    fn test_total_supply_overflow_is_an_error() {
        let (ledger, _temp) = create_test_ledger();
        let user = ledger.create_account().unwrap();

        // Admin holds 1e19, so one more MAX balance cannot be summed
        ledger
            .request_loan(&user.address, Decimal::MAX, "max")
            .unwrap();

        let err = ledger.total_supply().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_request_loan_unknown_address() {
        let (ledger, _temp) = create_test_ledger();
        let err = ledger
            .request_loan(&Address::new("VTghost"), Decimal::from(1), "x")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAddress);
        assert_eq!(ledger.chain().unwrap().len(), 1);
    }

    #[test]
    fn test_verify_chain() {
        let (ledger, _temp) = create_test_ledger();
        let (admin, passkey) = admin(&ledger);
        let user = ledger.create_account().unwrap();

        ledger
            .transfer(&admin, &user.address, Decimal::from(7), &passkey)
            .unwrap();
        ledger
            .request_loan(&user.address, Decimal::from(3), "x")
            .unwrap();

        let report = ledger.verify_chain().unwrap();
        assert_eq!(report.height, 3);
        assert_eq!(
            report.head_hash,
            ledger.chain_head().unwrap().map(|record| record.hash)
        );
    }

    #[test]
    fn test_empty_history_not_found() {
        let (ledger, _temp) = create_test_ledger();
        let user = ledger.create_account().unwrap();
        let err = ledger.transactions(&user.address).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
