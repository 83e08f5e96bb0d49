//! End-to-end ledger scenarios

use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use volta_ledger::{Config, ErrorKind, Ledger, LoanStatus};

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.rocksdb.sync_writes = false;
    config
}

fn initial_supply() -> Decimal {
    Decimal::from(10_000_000_000_000_000_000u64)
}

#[test]
fn scenario_a_transfer_without_funds() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();

    let x = ledger.create_account().unwrap();
    let y = ledger.create_account().unwrap();
    let height = ledger.chain().unwrap().len();

    let err = ledger
        .transfer(&x.address, &y.address, Decimal::from(10), &x.passkey)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.balance(&x.address).unwrap(), Decimal::ZERO);
    assert_eq!(ledger.balance(&y.address).unwrap(), Decimal::ZERO);
    assert_eq!(ledger.chain().unwrap().len(), height);
}

#[test]
fn scenario_b_admin_funds_new_account() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();

    let admin = ledger.admin_address().unwrap().unwrap();
    let admin_passkey = ledger.account(&admin).unwrap().passkey;
    let y = ledger.create_account().unwrap();
    let head = ledger.chain_head().unwrap().unwrap();

    let receipt = ledger
        .transfer(&admin, &y.address, Decimal::from(100), &admin_passkey)
        .unwrap();

    assert_eq!(ledger.balance(&y.address).unwrap(), Decimal::from(100));
    assert_eq!(
        ledger.balance(&admin).unwrap(),
        initial_supply() - Decimal::from(100)
    );

    let record = ledger.block(receipt.block_id).unwrap().unwrap();
    assert_eq!(record.id, head.id + 1);
    assert_eq!(record.previous_hash, head.hash);
    assert_eq!(record.hash, receipt.tx_hash);
}

#[test]
fn scenario_c_loan_gates_transfers_until_repaid() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();

    let x = ledger.create_account().unwrap();
    let y = ledger.create_account().unwrap();

    let issued = ledger
        .request_loan(&x.address, Decimal::from(500), "working capital")
        .unwrap();
    assert_eq!(issued.updated_balance, Decimal::from(500));
    assert!(ledger.is_loan_active(&x.address).unwrap());

    let err = ledger
        .transfer(&x.address, &y.address, Decimal::from(100), &x.passkey)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoanActive);

    ledger.repay_loan(&x.address, Decimal::from(500)).unwrap();
    let loans = ledger.loans(&x.address).unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].status, LoanStatus::Paid);

    // Balance is back to zero after repayment; fund X so the transfer can go through
    let admin = ledger.admin_address().unwrap().unwrap();
    let admin_passkey = ledger.account(&admin).unwrap().passkey;
    ledger
        .transfer(&admin, &x.address, Decimal::from(100), &admin_passkey)
        .unwrap();

    ledger
        .transfer(&x.address, &y.address, Decimal::from(100), &x.passkey)
        .unwrap();
    assert_eq!(ledger.balance(&y.address).unwrap(), Decimal::from(100));
    assert!(ledger.verify_chain().is_ok());
}

#[test]
fn bootstrap_is_idempotent_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let (admin, genesis_hash, user) = {
        let ledger = Ledger::open(test_config(&temp_dir)).unwrap();
        let admin = ledger.admin_address().unwrap().unwrap();
        let genesis_hash = ledger.chain().unwrap()[0].hash.clone();
        let user = ledger.create_account().unwrap();
        let passkey = ledger.account(&admin).unwrap().passkey;
        ledger
            .transfer(&admin, &user.address, Decimal::from(42), &passkey)
            .unwrap();
        (admin, genesis_hash, user)
    };

    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();
    let chain = ledger.chain().unwrap();

    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].hash, genesis_hash);
    assert_eq!(ledger.admin_address().unwrap(), Some(admin));
    assert_eq!(ledger.balance(&user.address).unwrap(), Decimal::from(42));
    assert_eq!(ledger.stats().unwrap().total_accounts, 2);
    assert_eq!(ledger.total_supply().unwrap(), initial_supply());
    assert_eq!(ledger.metrics().chain_height.get(), 2);
}

#[test]
fn history_read_is_idempotent_and_ordered() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();

    let admin = ledger.admin_address().unwrap().unwrap();
    let passkey = ledger.account(&admin).unwrap().passkey;
    let user = ledger.create_account().unwrap();

    for amount in [5, 6, 7] {
        ledger
            .transfer(&admin, &user.address, Decimal::from(amount), &passkey)
            .unwrap();
    }
    ledger
        .transfer(&user.address, &admin, Decimal::from(3), &user.passkey)
        .unwrap();

    let first = ledger.transactions(&user.address).unwrap();
    let second = ledger.transactions(&user.address).unwrap();
    assert_eq!(first, second);

    let amounts: Vec<_> = first.iter().map(|view| view.amount).collect();
    assert_eq!(
        amounts,
        vec![
            Decimal::from(5),
            Decimal::from(6),
            Decimal::from(7),
            Decimal::from(3)
        ]
    );
    assert_eq!(first[3].from, user.address);
}

#[test]
fn loan_flows_move_total_supply() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Ledger::open(test_config(&temp_dir)).unwrap();
    let user = ledger.create_account().unwrap();

    ledger
        .request_loan(&user.address, Decimal::from(300), "stock")
        .unwrap();
    assert_eq!(
        ledger.total_supply().unwrap(),
        initial_supply() + Decimal::from(300)
    );

    // Repayment amount is not checked against the loan
    let repaid = ledger.repay_loan(&user.address, Decimal::from(450)).unwrap();
    assert_eq!(repaid.updated_balance, Decimal::from(-150));
    assert_eq!(
        ledger.total_supply().unwrap(),
        initial_supply() - Decimal::from(150)
    );
}

#[test]
fn concurrent_transfers_conserve_supply() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(test_config(&temp_dir)).unwrap());

    let admin = ledger.admin_address().unwrap().unwrap();
    let admin_passkey = ledger.account(&admin).unwrap().passkey;
    let users: Vec<_> = (0..4).map(|_| ledger.create_account().unwrap()).collect();
    for user in &users {
        ledger
            .transfer(&admin, &user.address, Decimal::from(100), &admin_passkey)
            .unwrap();
    }

    let handles: Vec<_> = (0..users.len())
        .map(|i| {
            let ledger = ledger.clone();
            let from = users[i].clone();
            let to = users[(i + 1) % users.len()].address.clone();
            thread::spawn(move || {
                let mut committed = 0;
                for _ in 0..30 {
                    if ledger
                        .transfer(&from.address, &to, Decimal::from(7), &from.passkey)
                        .is_ok()
                    {
                        committed += 1;
                    }
                }
                committed
            })
        })
        .collect();

    let committed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(committed > 0);

    assert_eq!(ledger.total_supply().unwrap(), initial_supply());
    for user in &users {
        assert!(ledger.balance(&user.address).unwrap() >= Decimal::ZERO);
    }

    let report = ledger.verify_chain().unwrap();
    assert_eq!(report.height, 1 + users.len() as u64 + committed as u64);
}
