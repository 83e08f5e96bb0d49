//! Account ledger
//!
//! Address → balance plus identity metadata. Balance changes are staged in the
//! caller's [`WriteSet`] so they commit together with the transaction row and
//! chain record of the same operation.

use crate::{
    address::{AddressGenerator, Credentials},
    storage::{Storage, WriteSet},
    types::{Account, Address},
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Account ledger over the shared storage handle
#[derive(Debug, Clone)]
pub struct AccountLedger {
    storage: Arc<Storage>,
    generator: AddressGenerator,
}

impl AccountLedger {
    /// Create account ledger
    pub fn new(storage: Arc<Storage>, generator: AddressGenerator) -> Self {
        Self { storage, generator }
    }

    /// Stage the bootstrap admin account holding `initial_supply`
    pub fn create_admin_account(
        &self,
        ws: &mut WriteSet<'_>,
        initial_supply: Decimal,
    ) -> Result<Account> {
        let credentials = self.generator.admin_credentials();
        self.insert(ws, credentials, initial_supply)
    }

    /// Stage an ordinary account with a zero balance
    pub fn create_account(&self, ws: &mut WriteSet<'_>) -> Result<Account> {
        let credentials = self.generator.user_credentials();
        self.insert(ws, credentials, Decimal::ZERO)
    }

    fn insert(
        &self,
        ws: &mut WriteSet<'_>,
        credentials: Credentials,
        balance: Decimal,
    ) -> Result<Account> {
        let account = Account {
            address: credentials.address,
            passkey: credentials.passkey,
            identity: credentials.identity,
            balance,
            created_at: Utc::now(),
        };
        ws.insert_account(account.clone())?;
        Ok(account)
    }

    /// Committed account row
    pub fn get(&self, address: &Address) -> Result<Account> {
        self.storage
            .get_account(address)?
            .ok_or_else(|| Error::UnknownAddress(address.to_string()))
    }

    /// Committed balance
    pub fn get_balance(&self, address: &Address) -> Result<Decimal> {
        Ok(self.get(address)?.balance)
    }

    /// Account as seen by the write set
    pub fn resolve(&self, ws: &WriteSet<'_>, address: &Address) -> Result<Account> {
        ws.account(address)?
            .ok_or_else(|| Error::UnknownAddress(address.to_string()))
    }

    /// Add `amount` to the balance; returns the new balance
    pub fn credit(&self, ws: &mut WriteSet<'_>, address: &Address, amount: Decimal) -> Result<Decimal> {
        let mut account = self.resolve(ws, address)?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| overflow(&account, amount))?;
        let balance = account.balance;
        ws.put_account(account)?;
        Ok(balance)
    }

    /// Subtract `amount`; fails with `InsufficientFunds` when the balance is lower
    pub fn debit(&self, ws: &mut WriteSet<'_>, address: &Address, amount: Decimal) -> Result<Decimal> {
        let account = self.resolve(ws, address)?;
        ensure_funds(&account, amount)?;
        self.charge(ws, address, amount)
    }

    /// Subtract `amount` without a funds check; the balance may go negative
    pub fn charge(&self, ws: &mut WriteSet<'_>, address: &Address, amount: Decimal) -> Result<Decimal> {
        let mut account = self.resolve(ws, address)?;
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| overflow(&account, -amount))?;
        let balance = account.balance;
        ws.put_account(account)?;
        Ok(balance)
    }

    /// True iff `address` holds an active loan
    pub fn is_loan_active(&self, address: &Address) -> Result<bool> {
        Ok(self.storage.active_loan(address)?.is_some())
    }

    /// Sum of all balances, read from one snapshot
    pub fn total_balance(&self) -> Result<Decimal> {
        let accounts = self.storage.accounts()?;
        accounts
            .iter()
            .try_fold(Decimal::ZERO, |total, account| total.checked_add(account.balance))
            .ok_or(Error::SupplyOverflow(accounts.len()))
    }
}

fn overflow(account: &Account, amount: Decimal) -> Error {
    Error::BalanceOverflow {
        address: account.address.to_string(),
        balance: account.balance,
        amount,
    }
}

/// Fail with `InsufficientFunds` if `account` cannot cover `amount`
pub fn ensure_funds(account: &Account, amount: Decimal) -> Result<()> {
    if account.balance < amount {
        return Err(Error::InsufficientFunds {
            address: account.address.to_string(),
            balance: account.balance,
            requested: amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_ledger() -> (AccountLedger, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        let storage = Arc::new(Storage::open(&config).unwrap());
        let accounts = AccountLedger::new(storage.clone(), AddressGenerator::default());
        (accounts, storage, temp_dir)
    }

    #[test]
    fn test_create_account_starts_at_zero() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let account = accounts.create_account(&mut ws).unwrap();
        ws.commit().unwrap();

        assert!(!account.address.is_admin());
        assert_eq!(accounts.get_balance(&account.address).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_create_admin_account() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let admin = accounts
            .create_admin_account(&mut ws, Decimal::from(1_000))
            .unwrap();
        ws.commit().unwrap();

        assert!(admin.address.is_admin());
        assert_eq!(admin.passkey, AddressGenerator::default().admin_passkey());
        assert_eq!(accounts.get_balance(&admin.address).unwrap(), Decimal::from(1_000));
    }

    #[test]
    fn test_unknown_address() {
        let (accounts, _storage, _temp) = test_ledger();
        let err = accounts.get_balance(&Address::new("VTnope")).unwrap_err();
        assert!(matches!(err, Error::UnknownAddress(_)));
    }

    #[test]
    fn test_credit_and_debit() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let account = accounts.create_account(&mut ws).unwrap();
        ws.commit().unwrap();

        let mut ws = storage.write_set();
        assert_eq!(
            accounts.credit(&mut ws, &account.address, Decimal::from(50)).unwrap(),
            Decimal::from(50)
        );
        assert_eq!(
            accounts.debit(&mut ws, &account.address, Decimal::from(20)).unwrap(),
            Decimal::from(30)
        );
        ws.commit().unwrap();

        assert_eq!(accounts.get_balance(&account.address).unwrap(), Decimal::from(30));
    }

    #[test]
    fn test_debit_rejects_overdraft() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let account = accounts.create_account(&mut ws).unwrap();
        let err = accounts
            .debit(&mut ws, &account.address, Decimal::from(1))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[test]
    fn test_charge_may_go_negative() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let account = accounts.create_account(&mut ws).unwrap();
        let balance = accounts
            .charge(&mut ws, &account.address, Decimal::from(5))
            .unwrap();
        assert_eq!(balance, Decimal::from(-5));
    }

    #[test]
    fn test_credit_overflow_stages_nothing() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let admin = accounts
            .create_admin_account(&mut ws, Decimal::from(10))
            .unwrap();
        ws.commit().unwrap();

        let mut ws = storage.write_set();
        let err = accounts
            .credit(&mut ws, &admin.address, Decimal::MAX)
            .unwrap_err();
        assert!(matches!(err, Error::BalanceOverflow { .. }));
        assert!(ws.is_empty());
    }

    #[test]
    fn test_charge_overflow() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let account = accounts.create_account(&mut ws).unwrap();
        accounts
            .charge(&mut ws, &account.address, Decimal::MAX)
            .unwrap();
        let err = accounts
            .charge(&mut ws, &account.address, Decimal::MAX)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidAmount);
        assert_eq!(
            ws.account(&account.address).unwrap().unwrap().balance,
            -Decimal::MAX
        );
    }

    #[test]
    fn test_total_balance_overflow() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        let first = accounts.create_account(&mut ws).unwrap();
        let second = accounts.create_account(&mut ws).unwrap();
        accounts.credit(&mut ws, &first.address, Decimal::MAX).unwrap();
        accounts.credit(&mut ws, &second.address, Decimal::ONE).unwrap();
        ws.commit().unwrap();

        let err = accounts.total_balance().unwrap_err();
        assert!(matches!(err, Error::SupplyOverflow(2)));
    }

    #[test]
    fn test_total_balance() {
        let (accounts, storage, _temp) = test_ledger();

        let mut ws = storage.write_set();
        accounts
            .create_admin_account(&mut ws, Decimal::from(100))
            .unwrap();
        accounts.create_account(&mut ws).unwrap();
        ws.commit().unwrap();

        assert_eq!(accounts.total_balance().unwrap(), Decimal::from(100));
    }
}
