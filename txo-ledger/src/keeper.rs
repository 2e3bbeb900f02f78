//! Transfer orchestration
//!
//! The [`Keeper`] ties the ledger store and the deduction walk into the
//! transfer protocol:
//!
//! 1. Load the source wallet and resolve its TXOs
//! 2. Deduct oldest-first and apply the new used amounts
//! 3. Trim exhausted ids off the front of the source wallet
//! 4. Mint the destination TXO carrying the references
//! 5. Append it to the (possibly new) destination wallet
//!
//! Every write of a transfer is staged into one [`WriteSet`] and committed
//! at the end, so a rejected transfer writes nothing.
//!
//! # Example
//!
//! ```no_run
//! use txo_ledger::{Amount, Keeper, MemoryStore};
//!
//! fn main() -> txo_ledger::Result<()> {
//!     let keeper = Keeper::new(MemoryStore::new())?;
//!     keeper.mint("alice", "cet", Amount::new(10), 1, "genesis")?;
//!     keeper.transfer("alice", "bob", "cet", Amount::new(4), 2, "tx1")?;
//!     assert_eq!(keeper.balance("alice", "cet")?, Amount::new(6));
//!     Ok(())
//! }
//! ```

use crate::{
    config::LedgerConfig,
    deduct::deduct,
    error::{Error, Result},
    ledger::LedgerStore,
    metrics::Metrics,
    storage::{KvStore, RocksStore, WriteSet},
    types::{Amount, Txo, Wallet},
    Config,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Transfer orchestrator
pub struct Keeper<S> {
    /// Typed record access
    store: LedgerStore<S>,

    /// Transfer behaviour
    config: LedgerConfig,

    /// Counters and latencies
    metrics: Metrics,
}

impl Keeper<RocksStore> {
    /// Open a RocksDB-backed keeper
    pub fn open(config: &Config) -> Result<Self> {
        let kv = RocksStore::open(config)?;
        Self::with_config(kv, config.ledger.clone())
    }
}

impl<S: KvStore> Keeper<S> {
    /// Keeper with default behaviour
    pub fn new(kv: S) -> Result<Self> {
        Self::with_config(kv, LedgerConfig::default())
    }

    /// Keeper with explicit behaviour
    pub fn with_config(kv: S, config: LedgerConfig) -> Result<Self> {
        Ok(Self {
            store: LedgerStore::new(kv),
            config,
            metrics: Metrics::new()?,
        })
    }

    /// Ledger store
    pub fn store(&self) -> &LedgerStore<S> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Move `amount` of `token` from `src` to `dst` as a new TXO `id`.
    ///
    /// An empty `src` mints from outside the ledger. `id` must be unique;
    /// reusing one overwrites the earlier TXO unless
    /// [`LedgerConfig::reject_duplicate_ids`] is set.
    pub fn transfer(
        &self,
        src: &str,
        dst: &str,
        token: &str,
        amount: Amount,
        timestamp: i64,
        id: &str,
    ) -> Result<()> {
        let started = Instant::now();

        match self.apply_transfer(src, dst, token, amount, timestamp, id) {
            Ok(ref_count) => {
                let elapsed = started.elapsed().as_secs_f64();
                if src.is_empty() {
                    self.metrics.record_mint(elapsed);
                } else {
                    self.metrics.record_transfer(ref_count, elapsed);
                }

                tracing::info!(
                    src = %src,
                    dst = %dst,
                    token = %token,
                    amount = %amount,
                    txo_id = %id,
                    refs = ref_count,
                    "Transfer committed"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_failure();
                tracing::warn!(
                    src = %src,
                    dst = %dst,
                    token = %token,
                    amount = %amount,
                    txo_id = %id,
                    error = %err,
                    "Transfer rejected"
                );
                Err(err)
            }
        }
    }

    /// Mint `amount` of `token` to `owner` with no source references
    pub fn mint(
        &self,
        owner: &str,
        token: &str,
        amount: Amount,
        timestamp: i64,
        id: &str,
    ) -> Result<()> {
        self.transfer("", owner, token, amount, timestamp, id)
    }

    /// Stage and commit one transfer, returning the number of references
    fn apply_transfer(
        &self,
        src: &str,
        dst: &str,
        token: &str,
        amount: Amount,
        timestamp: i64,
        id: &str,
    ) -> Result<usize> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "Transfer amount must be positive".to_string(),
            ));
        }

        if self.config.reject_duplicate_ids && self.store.load_txo_json(id)?.is_some() {
            return Err(Error::DuplicateTxo(id.to_string()));
        }

        let mut writes = WriteSet::new();
        let mut refs = Vec::new();
        let mut source_wallet = None;

        if !src.is_empty() {
            let mut wallet = self
                .store
                .load_wallet(src, token)?
                .ok_or_else(|| Error::WalletNotFound {
                    owner: src.to_string(),
                    token: token.to_string(),
                })?;
            let mut txos = self.store.load_txos(&wallet.txo_ids)?;

            let deduction = deduct(&txos, amount)?;
            deduction.apply(&mut txos)?;

            // Untouched TXOs re-encode to identical bytes
            for txo in &txos {
                self.store.stage_txo(&mut writes, txo)?;
            }

            wallet.txo_ids.drain(..deduction.spent_prefix());
            self.store.stage_wallet(&mut writes, &wallet)?;

            refs = deduction.into_refs();
            source_wallet = Some(wallet);
        }

        // A self transfer must append to the already trimmed wallet
        let mut dst_wallet = match source_wallet {
            Some(wallet) if wallet.owner == dst => wallet,
            _ => self
                .store
                .load_wallet(dst, token)?
                .unwrap_or_else(|| Wallet::new(dst, token)),
        };

        let ref_count = refs.len();
        let txo = Txo::mint(timestamp, dst, id, token, amount, refs);
        self.store.stage_txo(&mut writes, &txo)?;

        dst_wallet.txo_ids.push(id.to_string());
        self.store.stage_wallet(&mut writes, &dst_wallet)?;

        self.store.commit(writes, self.config.atomic_batches)?;
        Ok(ref_count)
    }

    /// Unspent balance of a wallet, zero when it does not exist
    pub fn balance(&self, owner: &str, token: &str) -> Result<Amount> {
        let Some(wallet) = self.store.load_wallet(owner, token)? else {
            return Ok(Amount::zero());
        };

        self.store
            .load_txos(&wallet.txo_ids)?
            .iter()
            .try_fold(Amount::zero(), |total, txo| total.checked_add(txo.remaining()?))
    }

    /// Check that every listed TXO exists, belongs to the wallet and still
    /// has value left
    pub fn verify_wallet(&self, owner: &str, token: &str) -> Result<()> {
        let wallet = self
            .store
            .load_wallet(owner, token)?
            .ok_or_else(|| Error::WalletNotFound {
                owner: owner.to_string(),
                token: token.to_string(),
            })?;

        for txo in self.store.load_txos(&wallet.txo_ids)? {
            if txo.owner != wallet.owner || txo.token != wallet.token {
                return Err(Error::InvariantViolation(format!(
                    "TXO {} belongs to {}:{}, listed in {}:{}",
                    txo.id, txo.owner, txo.token, wallet.owner, wallet.token
                )));
            }
            if txo.is_all_used() {
                return Err(Error::InvariantViolation(format!(
                    "TXO {} is fully used but still listed in {}:{}",
                    txo.id, wallet.owner, wallet.token
                )));
            }
        }

        Ok(())
    }

    /// Collect every TXO a TXO's value was drawn from, back to the mints.
    ///
    /// Each stored TXO is loaded once however many paths lead to it, and
    /// the walk keeps its own stack so history depth is bounded by memory
    /// only.
    pub fn provenance(&self, id: &str) -> Result<Provenance> {
        let mut found: HashMap<String, Txo> = HashMap::new();
        let mut pending = vec![id.to_string()];

        while let Some(next) = pending.pop() {
            if found.contains_key(&next) {
                continue;
            }
            let txo = self
                .store
                .load_txo(&next)?
                .ok_or_else(|| Error::TxoNotFound(next.clone()))?;
            pending.extend(
                txo.ref_list
                    .iter()
                    .filter(|txo_ref| !found.contains_key(&txo_ref.source_id))
                    .map(|txo_ref| txo_ref.source_id.clone()),
            );
            found.insert(next, txo);
        }

        Provenance::from_history(id, found)
    }

    /// Close the backend
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

/// The funding history of one TXO as a reference graph.
///
/// Edges are the `ref_list` entries of the stored TXOs. Every TXO appears
/// once, listed before any TXO it drew from, so the root comes first.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    txos: Vec<Txo>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Provenance {
    /// Order the collected TXOs from the root down, failing on a cycle
    fn from_history(root: &str, mut found: HashMap<String, Txo>) -> Result<Self> {
        let mut pending_refs: HashMap<&str, usize> = HashMap::with_capacity(found.len());
        for txo in found.values() {
            for txo_ref in &txo.ref_list {
                *pending_refs.entry(txo_ref.source_id.as_str()).or_default() += 1;
            }
        }

        let mut order: Vec<String> = Vec::with_capacity(found.len());
        let mut ready = VecDeque::new();
        if !pending_refs.contains_key(root) {
            ready.push_back(root);
        }
        while let Some(id) = ready.pop_front() {
            order.push(id.to_string());
            let Some(txo) = found.get(id) else { continue };
            for txo_ref in &txo.ref_list {
                let source = txo_ref.source_id.as_str();
                if let Some(count) = pending_refs.get_mut(source) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(source);
                    }
                }
            }
        }

        if order.len() != found.len() {
            return Err(Error::InvariantViolation(format!(
                "Reference cycle in the history of TXO {}",
                root
            )));
        }

        let txos: Vec<Txo> = order.iter().filter_map(|id| found.remove(id)).collect();
        let index = txos
            .iter()
            .enumerate()
            .map(|(position, txo)| (txo.id.clone(), position))
            .collect();
        Ok(Self { txos, index })
    }

    /// The TXO the history was collected for
    pub fn root(&self) -> &Txo {
        &self.txos[0]
    }

    /// Every TXO in the history, root first
    pub fn txos(&self) -> &[Txo] {
        &self.txos
    }

    /// Number of distinct TXOs in the history
    pub fn len(&self) -> usize {
        self.txos.len()
    }

    /// Always false, the root is part of its own history
    pub fn is_empty(&self) -> bool {
        self.txos.is_empty()
    }

    /// Look up a TXO of the history
    pub fn get(&self, id: &str) -> Option<&Txo> {
        self.index.get(id).map(|&position| &self.txos[position])
    }

    /// Sources of `txo` with the amount drawn from each, in reference order
    pub fn sources<'a>(&'a self, txo: &'a Txo) -> impl Iterator<Item = (Amount, &'a Txo)> + 'a {
        txo.ref_list
            .iter()
            .filter_map(move |txo_ref| Some((txo_ref.amount, self.get(&txo_ref.source_id)?)))
    }

    /// Distinct mints at the bottom of the history, each with the total the
    /// history drew from it directly. A mint root is its own origin.
    pub fn origins(&self) -> Result<Vec<(&Txo, Amount)>> {
        let root = self.root();
        if root.is_mint() {
            return Ok(vec![(root, root.amount)]);
        }

        let mut drawn: HashMap<&str, Amount> = HashMap::new();
        for txo in &self.txos {
            for (amount, source) in self.sources(txo) {
                if source.is_mint() {
                    let total = drawn.entry(source.id.as_str()).or_default();
                    *total = total.checked_add(amount)?;
                }
            }
        }

        Ok(self
            .txos
            .iter()
            .filter_map(|txo| Some((txo, *drawn.get(txo.id.as_str())?)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::TxoRef;

    fn keeper() -> Keeper<MemoryStore> {
        Keeper::new(MemoryStore::new()).unwrap()
    }

    #[test]
    fn test_mint_creates_wallet() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(5), 10, "m1").unwrap();

        let txo = keeper.store().load_txo("m1").unwrap().unwrap();
        assert!(txo.is_mint());
        assert_eq!(txo.owner, "alice");

        let wallet = keeper.store().load_wallet("alice", "cet").unwrap().unwrap();
        assert_eq!(wallet.txo_ids, vec!["m1".to_string()]);
        assert_eq!(keeper.balance("alice", "cet").unwrap(), Amount::new(5));
        assert_eq!(keeper.metrics().mints_total.get(), 1);
    }

    #[test]
    fn test_missing_source_wallet() {
        let keeper = keeper();
        let err = keeper
            .transfer("alice", "bob", "cet", Amount::new(1), 0, "tx1")
            .unwrap_err();
        assert!(matches!(err, Error::WalletNotFound { .. }));
        assert!(keeper.store().load_txo("tx1").unwrap().is_none());
        assert_eq!(keeper.metrics().failures_total.get(), 1);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(5), 0, "m1").unwrap();
        let err = keeper
            .transfer("alice", "bob", "cet", Amount::zero(), 0, "tx1")
            .unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_dangling_wallet_entry() {
        let keeper = keeper();
        let mut wallet = Wallet::new("alice", "cet");
        wallet.txo_ids.push("ghost".to_string());
        keeper.store().save_wallet(&wallet).unwrap();

        let err = keeper
            .transfer("alice", "bob", "cet", Amount::new(1), 0, "tx1")
            .unwrap_err();
        assert!(matches!(err, Error::TxoNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_duplicate_id_guard() {
        let config = LedgerConfig {
            reject_duplicate_ids: true,
            ..LedgerConfig::default()
        };
        let keeper = Keeper::with_config(MemoryStore::new(), config).unwrap();
        keeper.mint("alice", "cet", Amount::new(5), 0, "m1").unwrap();

        let err = keeper.mint("bob", "cet", Amount::new(1), 0, "m1").unwrap_err();
        assert!(matches!(err, Error::DuplicateTxo(_)));
        assert!(keeper.store().load_wallet("bob", "cet").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_overwrites_by_default() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(5), 0, "m1").unwrap();
        keeper.mint("bob", "cet", Amount::new(1), 0, "m1").unwrap();

        let txo = keeper.store().load_txo("m1").unwrap().unwrap();
        assert_eq!(txo.owner, "bob");
    }

    #[test]
    fn test_self_transfer_keeps_trimmed_wallet() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(3), 0, "m1").unwrap();
        keeper.mint("alice", "cet", Amount::new(3), 1, "m2").unwrap();

        keeper
            .transfer("alice", "alice", "cet", Amount::new(4), 2, "tx1")
            .unwrap();

        let wallet = keeper.store().load_wallet("alice", "cet").unwrap().unwrap();
        assert_eq!(wallet.txo_ids, vec!["m2".to_string(), "tx1".to_string()]);
        assert_eq!(keeper.balance("alice", "cet").unwrap(), Amount::new(6));
        keeper.verify_wallet("alice", "cet").unwrap();
    }

    #[test]
    fn test_sequential_commit_mode() {
        let config = LedgerConfig {
            atomic_batches: false,
            ..LedgerConfig::default()
        };
        let keeper = Keeper::with_config(MemoryStore::new(), config).unwrap();
        keeper.mint("alice", "cet", Amount::new(3), 0, "m1").unwrap();
        keeper
            .transfer("alice", "bob", "cet", Amount::new(3), 1, "tx1")
            .unwrap();

        assert_eq!(keeper.balance("alice", "cet").unwrap(), Amount::zero());
        assert_eq!(keeper.balance("bob", "cet").unwrap(), Amount::new(3));
        let wallet = keeper.store().load_wallet("alice", "cet").unwrap().unwrap();
        assert!(wallet.txo_ids.is_empty());
    }

    #[test]
    fn test_balance_of_unknown_wallet() {
        assert_eq!(keeper().balance("nobody", "cet").unwrap(), Amount::zero());
    }

    #[test]
    fn test_verify_wallet_flags_foreign_txo() {
        let keeper = keeper();
        keeper.mint("bob", "cet", Amount::new(3), 0, "m1").unwrap();

        let mut wallet = Wallet::new("alice", "cet");
        wallet.txo_ids.push("m1".to_string());
        keeper.store().save_wallet(&wallet).unwrap();

        assert!(matches!(
            keeper.verify_wallet("alice", "cet"),
            Err(Error::InvariantViolation(_))
        ));
        keeper.verify_wallet("bob", "cet").unwrap();
    }

    #[test]
    fn test_provenance() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(3), 0, "m1").unwrap();
        keeper.mint("alice", "cet", Amount::new(3), 1, "m2").unwrap();
        keeper
            .transfer("alice", "bob", "cet", Amount::new(4), 2, "tx1")
            .unwrap();
        keeper
            .transfer("bob", "carol", "cet", Amount::new(2), 3, "tx2")
            .unwrap();

        let history = keeper.provenance("tx2").unwrap();
        assert_eq!(history.root().ref_list, vec![TxoRef::new("tx1", Amount::new(2))]);
        assert_eq!(history.len(), 4);

        let tx1 = history.get("tx1").unwrap();
        let sources: Vec<(Amount, &str)> = history
            .sources(tx1)
            .map(|(amount, txo)| (amount, txo.id.as_str()))
            .collect();
        assert_eq!(sources, vec![(Amount::new(3), "m1"), (Amount::new(1), "m2")]);

        let origins: Vec<(&str, Amount)> = history
            .origins()
            .unwrap()
            .into_iter()
            .map(|(txo, amount)| (txo.id.as_str(), amount))
            .collect();
        assert_eq!(origins, vec![("m1", Amount::new(3)), ("m2", Amount::new(1))]);
    }

    #[test]
    fn test_provenance_of_mint() {
        let keeper = keeper();
        keeper.mint("alice", "cet", Amount::new(3), 0, "m1").unwrap();

        let history = keeper.provenance("m1").unwrap();
        assert_eq!(history.len(), 1);
        let origins = history.origins().unwrap();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].0.id, "m1");
        assert_eq!(origins[0].1, Amount::new(3));
    }

    #[test]
    fn test_provenance_split_and_merge() {
        let keeper = keeper();
        keeper.mint("a", "cet", Amount::new(2), 0, "genesis").unwrap();

        // Each round splits a's two units across b and c, then merges them back
        let mut timestamp = 1;
        for round in 0..20 {
            for (src, dst, id) in [
                ("a", "b", format!("split-b-{}", round)),
                ("a", "c", format!("split-c-{}", round)),
                ("b", "a", format!("merge-b-{}", round)),
                ("c", "a", format!("merge-c-{}", round)),
            ] {
                keeper
                    .transfer(src, dst, "cet", Amount::new(1), timestamp, &id)
                    .unwrap();
                timestamp += 1;
            }
        }
        keeper
            .transfer("a", "d", "cet", Amount::new(2), timestamp, "final")
            .unwrap();

        let history = keeper.provenance("final").unwrap();
        assert_eq!(history.len(), 82);
        assert_eq!(history.root().id, "final");

        let origins = history.origins().unwrap();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].0.id, "genesis");
        assert_eq!(origins[0].1, Amount::new(2));
    }

    #[test]
    fn test_provenance_deep_chain() {
        let keeper = keeper();
        keeper.mint("a", "cet", Amount::new(1), 0, "hop-0").unwrap();

        let hops = 20_000;
        for hop in 1..=hops {
            let (src, dst) = if hop % 2 == 1 { ("a", "b") } else { ("b", "a") };
            keeper
                .transfer(src, dst, "cet", Amount::new(1), hop, &format!("hop-{}", hop))
                .unwrap();
        }

        let history = keeper.provenance(&format!("hop-{}", hops)).unwrap();
        assert_eq!(history.len(), hops as usize + 1);
        assert_eq!(history.txos().last().unwrap().id, "hop-0");

        let origins = history.origins().unwrap();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].0.id, "hop-0");
        assert_eq!(origins[0].1, Amount::new(1));
    }

    #[test]
    fn test_provenance_cycle() {
        let keeper = keeper();
        let mut a = Txo::mint(0, "alice", "a", "cet", Amount::new(1), vec![]);
        a.ref_list.push(TxoRef::new("b", Amount::new(1)));
        let mut b = Txo::mint(0, "alice", "b", "cet", Amount::new(1), vec![]);
        b.ref_list.push(TxoRef::new("a", Amount::new(1)));
        keeper.store().save_txo(&a).unwrap();
        keeper.store().save_txo(&b).unwrap();

        assert!(matches!(
            keeper.provenance("a"),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            keeper.provenance("missing"),
            Err(Error::TxoNotFound(_))
        ));
    }
}
