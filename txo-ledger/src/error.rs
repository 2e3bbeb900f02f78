//! Error types for the ledger

use crate::types::Amount;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Source wallet does not exist
    #[error("Wallet not found: {owner}:{token}")]
    WalletNotFound {
        /// Wallet owner
        owner: String,
        /// Wallet token
        token: String,
    },

    /// A wallet references a TXO that is not in storage
    #[error("TXO not found: {0}")]
    TxoNotFound(String),

    /// Unspent value across the source TXOs is below the requested amount
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount asked for
        requested: Amount,
        /// Unspent amount that was found
        available: Amount,
    },

    /// Stored bytes do not decode into the expected record
    #[error("Corrupt {kind} record: {reason}")]
    CorruptRecord {
        /// Record kind (`txo` or `wallet`)
        kind: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Amount is malformed or not acceptable for the operation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Addition exceeded the representable amount range
    #[error("Amount overflow")]
    AmountOverflow,

    /// Subtraction would produce a negative amount
    #[error("Amount underflow")]
    AmountUnderflow,

    /// A TXO with this id already exists
    #[error("Duplicate TXO id: {0}")]
    DuplicateTxo(String),

    /// Invariant violation (used amount above amount, foreign TXO in wallet, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
