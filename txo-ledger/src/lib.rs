//! TXO Ledger
//!
//! Chain-of-custody token accounting. Every unit of value lives in a
//! tracked output (TXO); transfers draw from a wallet's TXOs oldest-first
//! and mint a new TXO that references exactly what it drew.
//!
//! # Architecture
//!
//! - **Records**: TXOs and wallets stored as canonical JSON under namespaced keys
//! - **Deduction**: pure FIFO walk producing references and used-amount updates
//! - **Keeper**: stages every write of a transfer and commits them as one batch
//! - **Single Writer**: callers serialize transfers on overlapping wallets
//!
//! # Invariants
//!
//! - Conservation: Σ(refs.amount) == transferred amount
//! - Monotonicity: 0 <= used_amount <= amount, used_amount never decreases
//! - FIFO: a later TXO is never drawn while an earlier one has value left
//! - Retention: TXOs are never deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod codec;
pub mod config;
pub mod deduct;
pub mod error;
pub mod keeper;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, LedgerConfig};
pub use deduct::{deduct, Deduction};
pub use error::{Error, Result};
pub use keeper::{Keeper, Provenance};
pub use ledger::LedgerStore;
pub use storage::{KvStore, MemoryStore, RocksStore, WriteSet};
pub use types::{Amount, Txo, TxoRef, Wallet};
