//! Typed records over the flat key space
//!
//! # Key layout
//!
//! - TXO: `0x64 || id`
//! - Wallet: `0x65 || owner || ':' || token`
//!
//! The wallet separator is not escaped: an owner or token containing `:`
//! can collide with another pair. Callers restrict identifier alphabets.

use crate::{
    codec::{self, Record},
    error::{Error, Result},
    storage::{KvStore, WriteSet},
    types::{Txo, Wallet},
};

/// TXO namespace byte
pub const TXO_PREFIX: u8 = 0x64;

/// Wallet namespace byte
pub const WALLET_PREFIX: u8 = 0x65;

/// Storage key of a TXO
pub fn txo_key(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.len() + 1);
    key.push(TXO_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Storage key of a wallet
pub fn wallet_key(owner: &str, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + token.len() + 2);
    key.push(WALLET_PREFIX);
    key.extend_from_slice(owner.as_bytes());
    key.push(b':');
    key.extend_from_slice(token.as_bytes());
    key
}

/// Maps TXO and wallet records onto a [`KvStore`]
pub struct LedgerStore<S> {
    kv: S,
}

impl<S: KvStore> LedgerStore<S> {
    /// Wrap a backend
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Underlying backend
    pub fn kv(&self) -> &S {
        &self.kv
    }

    // TXO operations

    /// Write a TXO, overwriting any record with the same id
    pub fn save_txo(&self, txo: &Txo) -> Result<()> {
        self.kv.set(&txo_key(&txo.id), &codec::encode(txo)?)?;
        tracing::debug!(txo_id = %txo.id, used_amount = %txo.used_amount, "TXO saved");
        Ok(())
    }

    /// Stored bytes of a TXO
    pub fn load_txo_json(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.get_raw(&txo_key(id))
    }

    /// Load a TXO, `None` when absent
    pub fn load_txo(&self, id: &str) -> Result<Option<Txo>> {
        self.load_record(&txo_key(id))
    }

    /// Load TXOs in the given order, failing on the first missing id
    pub fn load_txos(&self, ids: &[String]) -> Result<Vec<Txo>> {
        ids.iter()
            .map(|id| {
                self.load_txo(id)?
                    .ok_or_else(|| Error::TxoNotFound(id.clone()))
            })
            .collect()
    }

    /// Queue a TXO write
    pub fn stage_txo(&self, writes: &mut WriteSet, txo: &Txo) -> Result<()> {
        writes.put(txo_key(&txo.id), codec::encode(txo)?);
        Ok(())
    }

    // Wallet operations

    /// Write a wallet
    pub fn save_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.kv
            .set(&wallet_key(&wallet.owner, &wallet.token), &codec::encode(wallet)?)?;
        tracing::debug!(
            owner = %wallet.owner,
            token = %wallet.token,
            txo_count = wallet.txo_ids.len(),
            "Wallet saved"
        );
        Ok(())
    }

    /// Stored bytes of a wallet
    pub fn load_wallet_json(&self, owner: &str, token: &str) -> Result<Option<Vec<u8>>> {
        self.get_raw(&wallet_key(owner, token))
    }

    /// Load a wallet, `None` when absent
    pub fn load_wallet(&self, owner: &str, token: &str) -> Result<Option<Wallet>> {
        self.load_record(&wallet_key(owner, token))
    }

    /// Queue a wallet write
    pub fn stage_wallet(&self, writes: &mut WriteSet, wallet: &Wallet) -> Result<()> {
        writes.put(
            wallet_key(&wallet.owner, &wallet.token),
            codec::encode(wallet)?,
        );
        Ok(())
    }

    // Commit

    /// Apply queued writes, as one batch or one key at a time
    pub fn commit(&self, writes: WriteSet, atomic: bool) -> Result<()> {
        let count = writes.len();
        if atomic {
            self.kv.write(writes)?;
        } else {
            for (key, value) in writes {
                self.kv.set(&key, &value)?;
            }
        }
        tracing::debug!(writes = count, atomic, "Write set committed");
        Ok(())
    }

    /// Close the backend
    pub fn close(self) -> Result<()> {
        self.kv.close()
    }

    // Helpers

    /// An empty value counts as absent
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.kv.get(key)?.filter(|bytes| !bytes.is_empty()))
    }

    fn load_record<R: Record>(&self, key: &[u8]) -> Result<Option<R>> {
        let Some(bytes) = self.get_raw(key)? else {
            return Ok(None);
        };

        match codec::decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                tracing::error!(
                    key = %String::from_utf8_lossy(&key[1..]),
                    error = %err,
                    "Undecodable record"
                );
                Err(err)
            }
        }
    }
}
