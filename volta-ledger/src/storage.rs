//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: address)
//! - `transactions` - Transaction rows (key: content hash)
//! - `blocks` - Chain records (key: record id, big-endian)
//! - `loans` - Loan rows (key: loan id, big-endian)
//! - `indices` - Per-address history and active-loan indices
//! - `meta` - Sequence counters, genesis payload, admin address
//!
//! Every logical operation stages its mutations in a [`WriteSet`] and commits
//! them with one `WriteBatch`. Dropping a write set discards it. Multi-key reads
//! go through a RocksDB snapshot.

use crate::{
    error::{Error, Result},
    types::{Account, Address, ChainRecord, Loan, Transaction},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    Snapshot, WriteBatch, WriteOptions, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_BLOCKS: &str = "blocks";
const CF_LOANS: &str = "loans";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

/// Sequence of history index entries
pub const SEQ_HISTORY: &str = "seq.history";
/// Sequence of loan ids
pub const SEQ_LOAN: &str = "seq.loan";
/// Serialized genesis payload
pub const META_GENESIS: &str = "genesis";
/// Admin address
pub const META_ADMIN: &str = "admin";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_LOANS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Start staging one logical operation
    pub fn write_set(&self) -> WriteSet<'_> {
        WriteSet::new(self)
    }

    // Account reads

    /// Get account by address
    pub fn get_account(&self, address: &Address) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db
            .get_cf(cf, address.as_str().as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    /// All accounts, read from one snapshot
    pub fn accounts(&self) -> Result<Vec<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let snapshot = self.db.snapshot();
        let mut accounts = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            accounts.push(decode(&value)?);
        }
        Ok(accounts)
    }

    // Transaction reads

    /// Get transaction by content hash
    pub fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        self.db
            .get_cf(cf, hash.as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    /// Transactions sent or received by `address`, in commit order
    pub fn transactions_for(&self, address: &Address) -> Result<Vec<Transaction>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let snapshot = self.db.snapshot();

        let prefix = history_prefix(address);
        let mut transactions = Vec::new();
        for (_, hash) in scan_prefix(&snapshot, cf_indices, &prefix)? {
            let value = snapshot.get_cf(cf_transactions, &hash)?.ok_or_else(|| {
                Error::Storage(format!(
                    "History index of {} points at missing transaction {}",
                    address,
                    String::from_utf8_lossy(&hash)
                ))
            })?;
            transactions.push(decode(&value)?);
        }

        Ok(transactions)
    }

    // Chain reads

    /// Get chain record by id
    pub fn get_block(&self, id: u64) -> Result<Option<ChainRecord>> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db
            .get_cf(cf, id.to_be_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    /// Record with the highest id
    pub fn latest_block(&self) -> Result<Option<ChainRecord>> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        if let Some(item) = self.db.iterator_cf(cf, IteratorMode::End).next() {
            let (_, value) = item?;
            return Ok(Some(decode(&value)?));
        }

        Ok(None)
    }

    /// All chain records in id order, read from one snapshot
    pub fn blocks(&self) -> Result<Vec<ChainRecord>> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let snapshot = self.db.snapshot();
        let mut blocks = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            blocks.push(decode(&value)?);
        }
        Ok(blocks)
    }

    // Loan reads

    /// Get loan by id
    pub fn get_loan(&self, id: u64) -> Result<Option<Loan>> {
        let cf = self.cf_handle(CF_LOANS)?;
        self.db
            .get_cf(cf, id.to_be_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    /// Active loan of `address`, if any
    pub fn active_loan(&self, address: &Address) -> Result<Option<Loan>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_loans = self.cf_handle(CF_LOANS)?;
        let snapshot = self.db.snapshot();

        let Some(id) = snapshot.get_cf(cf_indices, active_loan_key(address))? else {
            return Ok(None);
        };
        let value = snapshot.get_cf(cf_loans, &id)?.ok_or_else(|| {
            Error::Storage(format!("Active loan index of {} is dangling", address))
        })?;
        Ok(Some(decode(&value)?))
    }

    /// Every loan taken by `address`, oldest first
    pub fn loans_for(&self, address: &Address) -> Result<Vec<Loan>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_loans = self.cf_handle(CF_LOANS)?;
        let snapshot = self.db.snapshot();

        let prefix = loan_prefix(address);
        let mut loans = Vec::new();
        for (key, _) in scan_prefix(&snapshot, cf_indices, &prefix)? {
            let id = &key[prefix.len()..];
            let value = snapshot.get_cf(cf_loans, id)?.ok_or_else(|| {
                Error::Storage(format!("Loan index of {} is dangling", address))
            })?;
            loans.push(decode(&value)?);
        }
        Ok(loans)
    }

    // Metadata

    /// Raw metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_META)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    /// Current value of a sequence counter (0 when unused)
    pub fn counter(&self, key: &str) -> Result<u64> {
        match self.get_meta(key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!("Counter {} has {} bytes", key, bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let snapshot = self.db.snapshot();
        let count = |name: &str| -> Result<u64> {
            let cf = self.cf_handle(name)?;
            let mut total = 0u64;
            for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
                item?;
                total += 1;
            }
            Ok(total)
        };

        Ok(StorageStats {
            total_accounts: count(CF_ACCOUNTS)?,
            total_transactions: count(CF_TRANSACTIONS)?,
            total_blocks: count(CF_BLOCKS)?,
            total_loans: count(CF_LOANS)?,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Account rows
    pub total_accounts: u64,
    /// Transaction rows
    pub total_transactions: u64,
    /// Chain records
    pub total_blocks: u64,
    /// Loan rows
    pub total_loans: u64,
}

/// Staged mutations of one logical operation
///
/// Reads through a write set see its own staged rows first, then committed
/// state. Nothing reaches the database until [`WriteSet::commit`].
pub struct WriteSet<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    accounts: HashMap<Address, Account>,
    transactions: HashSet<String>,
    latest_block: Option<ChainRecord>,
    loans: HashMap<u64, Loan>,
    active_loans: HashMap<Address, Option<u64>>,
    counters: HashMap<&'static str, u64>,
}

impl<'a> WriteSet<'a> {
    fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            batch: WriteBatch::default(),
            accounts: HashMap::new(),
            transactions: HashSet::new(),
            latest_block: None,
            loans: HashMap::new(),
            active_loans: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Nothing staged yet
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    // Accounts

    /// Account as seen by this write set
    pub fn account(&self, address: &Address) -> Result<Option<Account>> {
        match self.accounts.get(address) {
            Some(account) => Ok(Some(account.clone())),
            None => self.storage.get_account(address),
        }
    }

    /// Stage a new account; the address must be unused
    pub fn insert_account(&mut self, account: Account) -> Result<()> {
        if self.account(&account.address)?.is_some() {
            return Err(Error::Storage(format!(
                "Address {} already exists",
                account.address
            )));
        }
        self.put_account(account)
    }

    /// Stage an account row
    pub fn put_account(&mut self, account: Account) -> Result<()> {
        let storage = self.storage;
        let cf = storage.cf_handle(CF_ACCOUNTS)?;
        self.batch
            .put_cf(cf, account.address.as_str().as_bytes(), encode(&account)?);

        tracing::debug!(address = %account.address, balance = %account.balance, "Account staged");

        self.accounts.insert(account.address.clone(), account);
        Ok(())
    }

    // Transactions

    /// Stage a transaction row and its history index entries
    ///
    /// A hash that is already present fails like a primary-key conflict.
    pub fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        if self.transactions.contains(&transaction.hash)
            || self.storage.get_transaction(&transaction.hash)?.is_some()
        {
            return Err(Error::Storage(format!(
                "Transaction {} already recorded",
                transaction.hash
            )));
        }

        let storage = self.storage;
        let cf_transactions = storage.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = storage.cf_handle(CF_INDICES)?;

        self.batch.put_cf(
            cf_transactions,
            transaction.hash.as_bytes(),
            encode(transaction)?,
        );

        let mut parties = vec![&transaction.from];
        if transaction.to != transaction.from {
            parties.push(&transaction.to);
        }
        for party in parties {
            let seq = self.next_id(SEQ_HISTORY)?;
            let mut key = history_prefix(party);
            key.extend_from_slice(&seq.to_be_bytes());
            self.batch
                .put_cf(cf_indices, key, transaction.hash.as_bytes());
        }

        self.transactions.insert(transaction.hash.clone());
        Ok(())
    }

    // Chain

    /// Newest chain record as seen by this write set
    pub fn latest_block(&self) -> Result<Option<ChainRecord>> {
        match &self.latest_block {
            Some(block) => Ok(Some(block.clone())),
            None => self.storage.latest_block(),
        }
    }

    /// Stage a chain record
    pub fn put_block(&mut self, block: ChainRecord) -> Result<()> {
        let storage = self.storage;
        let cf = storage.cf_handle(CF_BLOCKS)?;
        self.batch.put_cf(cf, block.id.to_be_bytes(), encode(&block)?);
        self.latest_block = Some(block);
        Ok(())
    }

    // Loans

    /// Active loan of `address` as seen by this write set
    pub fn active_loan(&self, address: &Address) -> Result<Option<Loan>> {
        match self.active_loans.get(address) {
            Some(Some(id)) => match self.loans.get(id) {
                Some(loan) => Ok(Some(loan.clone())),
                None => self.storage.get_loan(*id),
            },
            Some(None) => Ok(None),
            None => self.storage.active_loan(address),
        }
    }

    /// Stage a loan row, keeping the active-loan index in step with its status
    pub fn put_loan(&mut self, loan: Loan) -> Result<()> {
        let storage = self.storage;
        let cf_loans = storage.cf_handle(CF_LOANS)?;
        let cf_indices = storage.cf_handle(CF_INDICES)?;
        let id = loan.id.to_be_bytes();

        self.batch.put_cf(cf_loans, id, encode(&loan)?);

        let mut history_key = loan_prefix(&loan.address);
        history_key.extend_from_slice(&id);
        self.batch.put_cf(cf_indices, history_key, b"");

        if loan.is_active() {
            self.batch
                .put_cf(cf_indices, active_loan_key(&loan.address), id);
            self.active_loans.insert(loan.address.clone(), Some(loan.id));
        } else {
            self.batch
                .delete_cf(cf_indices, active_loan_key(&loan.address));
            self.active_loans.insert(loan.address.clone(), None);
        }

        self.loans.insert(loan.id, loan);
        Ok(())
    }

    // Metadata

    /// Advance a sequence counter and return the new value (first value is 1)
    pub fn next_id(&mut self, key: &'static str) -> Result<u64> {
        let current = match self.counters.get(key) {
            Some(value) => *value,
            None => self.storage.counter(key)?,
        };
        let next = current + 1;

        let storage = self.storage;
        let cf = storage.cf_handle(CF_META)?;
        self.batch.put_cf(cf, key.as_bytes(), next.to_be_bytes());
        self.counters.insert(key, next);
        Ok(next)
    }

    /// Stage a metadata value
    pub fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let storage = self.storage;
        let cf = storage.cf_handle(CF_META)?;
        self.batch.put_cf(cf, key.as_bytes(), value);
        Ok(())
    }

    /// Commit every staged write atomically
    pub fn commit(self) -> Result<usize> {
        let staged = self.batch.len();
        if staged == 0 {
            return Ok(0);
        }

        let mut opts = WriteOptions::default();
        opts.set_sync(self.storage.sync_writes);
        self.storage.db.write_opt(self.batch, &opts)?;

        tracing::debug!(writes = staged, "Write set committed");
        Ok(staged)
    }
}

// Encoding helpers

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

// Index key helpers

fn history_prefix(address: &Address) -> Vec<u8> {
    format!("tx|{}|", address).into_bytes()
}

fn loan_prefix(address: &Address) -> Vec<u8> {
    format!("loan|{}|", address).into_bytes()
}

fn active_loan_key(address: &Address) -> Vec<u8> {
    format!("active|{}", address).into_bytes()
}

fn scan_prefix(
    snapshot: &Snapshot<'_>,
    cf: &ColumnFamily,
    prefix: &[u8],
) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
    let mut entries = Vec::new();
    for item in snapshot.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
        let (key, value) = item?;
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key, value));
    }
    Ok(entries)
}
