//! Chain log
//!
//! Append-only, hash-linked records. Each record's `hash` is the digest of the
//! payload that triggered it (a transaction, or the genesis payload) and its
//! `previous_hash` is the `hash` of the record inserted just before it:
//!
//! ```text
//! #1 genesis   prev "0"       hash H(genesis payload)
//! #2 transfer  prev H(genesis) hash H(tx payload)
//! #3 loan      prev H(tx)      hash H(loan tx payload)
//! ```

use crate::{
    crypto::digest_payload,
    storage::{Storage, WriteSet, META_ADMIN, META_GENESIS},
    types::{Address, ChainRecord, ChainReport, GenesisBlock, GENESIS_PREVIOUS_HASH},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Chain log over the shared storage handle
#[derive(Debug, Clone)]
pub struct ChainLog {
    storage: Arc<Storage>,
}

impl ChainLog {
    /// Create chain log
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// At least one record exists
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.storage.latest_block()?.is_some())
    }

    /// Stage the genesis record and keep its payload for later verification
    pub fn append_genesis(
        &self,
        ws: &mut WriteSet<'_>,
        genesis: &GenesisBlock,
        at: DateTime<Utc>,
    ) -> Result<ChainRecord> {
        let (payload, hash) = digest_payload(genesis)?;
        ws.put_meta(META_GENESIS, payload.as_bytes())?;
        ws.put_meta(META_ADMIN, genesis.address.as_str().as_bytes())?;
        self.append(ws, &hash, Some(&genesis.address), at)
    }

    /// Stage a record sealing `content_hash`, linked to the current head
    pub fn append(
        &self,
        ws: &mut WriteSet<'_>,
        content_hash: &str,
        owner: Option<&Address>,
        at: DateTime<Utc>,
    ) -> Result<ChainRecord> {
        let (id, previous_hash) = match ws.latest_block()? {
            Some(head) => (head.id + 1, head.hash),
            None => (1, GENESIS_PREVIOUS_HASH.to_string()),
        };

        let record = ChainRecord {
            id,
            timestamp: at,
            hash: content_hash.to_string(),
            previous_hash,
            owner: owner.cloned(),
            created_at: Utc::now(),
        };
        ws.put_block(record.clone())?;

        tracing::debug!(
            block_id = record.id,
            hash = %record.hash,
            previous_hash = %record.previous_hash,
            "Chain record staged"
        );

        Ok(record)
    }

    /// Newest committed record
    pub fn head(&self) -> Result<Option<ChainRecord>> {
        self.storage.latest_block()
    }

    /// Committed record by id
    pub fn get(&self, id: u64) -> Result<Option<ChainRecord>> {
        self.storage.get_block(id)
    }

    /// All committed records in id order
    pub fn records(&self) -> Result<Vec<ChainRecord>> {
        self.storage.blocks()
    }

    /// Stored genesis payload
    pub fn genesis(&self) -> Result<Option<GenesisBlock>> {
        match self.storage.get_meta(META_GENESIS)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Address the genesis record is bound to
    pub fn admin_address(&self) -> Result<Option<Address>> {
        Ok(self
            .storage
            .get_meta(META_ADMIN)?
            .map(|bytes| Address::new(String::from_utf8_lossy(&bytes).into_owned())))
    }

    /// Walk the chain checking ids, links and the genesis digest
    ///
    /// `content_check` is called for every non-genesis record and returns
    /// whether its hash matches a known payload.
    pub fn verify<F>(&self, mut content_check: F) -> Result<ChainReport>
    where
        F: FnMut(&ChainRecord) -> Result<bool>,
    {
        let records = self.records()?;
        let genesis_payload = self.storage.get_meta(META_GENESIS)?;
        verify_records(&records, genesis_payload.as_deref(), &mut content_check)
    }
}

fn verify_records<F>(
    records: &[ChainRecord],
    genesis_payload: Option<&[u8]>,
    content_check: &mut F,
) -> Result<ChainReport>
where
    F: FnMut(&ChainRecord) -> Result<bool>,
{
    let mut previous: Option<&ChainRecord> = None;

    for record in records {
        let (expected_id, expected_previous) = match previous {
            Some(prev) => (prev.id + 1, prev.hash.as_str()),
            None => (1, GENESIS_PREVIOUS_HASH),
        };

        if record.id != expected_id {
            return Err(Error::ChainIntegrity {
                id: record.id,
                expected: format!("id {}", expected_id),
                actual: format!("id {}", record.id),
            });
        }

        if record.previous_hash != expected_previous {
            return Err(Error::ChainIntegrity {
                id: record.id,
                expected: expected_previous.to_string(),
                actual: record.previous_hash.clone(),
            });
        }

        if previous.is_none() {
            if let Some(payload) = genesis_payload {
                let digest = crate::crypto::sha256_hex(payload);
                if digest != record.hash {
                    return Err(Error::ChainIntegrity {
                        id: record.id,
                        expected: digest,
                        actual: record.hash.clone(),
                    });
                }
            }
        } else if !content_check(record)? {
            return Err(Error::ChainIntegrity {
                id: record.id,
                expected: "hash of a recorded transaction".to_string(),
                actual: record.hash.clone(),
            });
        }

        previous = Some(record);
    }

    Ok(ChainReport {
        height: records.len() as u64,
        genesis_hash: records.first().map(|r| r.hash.clone()),
        head_hash: records.last().map(|r| r.hash.clone()),
    })
}
