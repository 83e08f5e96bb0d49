//! Transaction recorder
//!
//! Builds the canonical `{"from","to","amount","date"}` payload, digests it with
//! SHA-256 and stages the row keyed by that digest.

use crate::{
    crypto::digest_payload,
    storage::{Storage, WriteSet},
    types::{Address, Transaction, TransactionPayload, DATE_FORMAT},
    Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Records transactions over the shared storage handle
#[derive(Debug, Clone)]
pub struct TransactionRecorder {
    storage: Arc<Storage>,
}

impl TransactionRecorder {
    /// Create recorder
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Content digest of a transaction
    pub fn digest(
        from: &Address,
        to: &Address,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<String> {
        let payload = TransactionPayload {
            from: from.as_str(),
            to: to.as_str(),
            amount,
            date: occurred_at.format(DATE_FORMAT).to_string(),
        };
        let (_, hash) = digest_payload(&payload)?;
        Ok(hash)
    }

    /// Build the transaction row and stage it
    ///
    /// Identical `from`/`to`/`amount`/`date` produce the same digest; the second
    /// insert then fails as a key conflict.
    pub fn record(
        &self,
        ws: &mut WriteSet<'_>,
        from: &Address,
        to: &Address,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<Transaction> {
        let transaction = Transaction {
            hash: Self::digest(from, to, amount, occurred_at)?,
            from: from.clone(),
            to: to.clone(),
            amount,
            occurred_at,
        };
        ws.insert_transaction(&transaction)?;

        tracing::debug!(
            tx_hash = %transaction.hash,
            from = %from,
            to = %to,
            amount = %amount,
            "Transaction staged"
        );

        Ok(transaction)
    }

    /// Committed transaction by digest
    pub fn get(&self, hash: &str) -> Result<Option<Transaction>> {
        self.storage.get_transaction(hash)
    }

    /// Committed history of `address`, oldest first
    pub fn history(&self, address: &Address) -> Result<Vec<Transaction>> {
        self.storage.transactions_for(address)
    }

    /// Recompute the digest from the stored row
    pub fn verify(transaction: &Transaction) -> Result<bool> {
        let expected = Self::digest(
            &transaction.from,
            &transaction.to,
            transaction.amount,
            transaction.occurred_at,
        )?;
        Ok(expected == transaction.hash)
    }
}
