//! Byte-key storage adapters
//!
//! The ledger only needs a flat key space with point reads, durable writes
//! and an atomic multi-key commit. Two backends are provided:
//!
//! - [`RocksStore`] - RocksDB, synchronous writes, `WriteBatch` commits
//! - [`MemoryStore`] - in-process map for tests and embedding

use crate::{error::Result, Config};
use parking_lot::RwLock;
use rocksdb::{DBCompactionStyle, Options, WriteBatch, WriteOptions, DB};
use std::collections::BTreeMap;

/// Key-value backend consumed by the ledger store
pub trait KvStore {
    /// Read a value, `None` when absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a single value; durable once this returns
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Apply every put in the set atomically, in order
    fn write(&self, writes: WriteSet) -> Result<()>;

    /// Release the backend
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Ordered list of puts. A later put to the same key wins.
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteSet {
    /// Create empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((key, value));
    }

    /// Number of queued puts
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// Nothing queued
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    /// Queued puts in order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.puts.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl IntoIterator for WriteSet {
    type Item = (Vec<u8>, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(Vec<u8>, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.puts.into_iter()
    }
}

/// RocksDB backend
pub struct RocksStore {
    db: DB,
    sync_writes: bool,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Records are rewritten in place, level compaction keeps reads cheap
        db_opts.set_compaction_style(DBCompactionStyle::Level);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let db = DB::open(&db_opts, path)?;

        tracing::info!(
            service = %config.service_name,
            path = ?path,
            sync_writes = config.rocksdb.sync_writes,
            "Opened RocksDB"
        );

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put_opt(key, value, &self.write_options())?;
        Ok(())
    }

    fn write(&self, writes: WriteSet) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in writes {
            batch.put(key, value);
        }

        // Atomic commit
        self.db.write_opt(batch, &self.write_options())?;
        Ok(())
    }

    fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, ordered by key
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// No keys stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write(&self, writes: WriteSet) -> Result<()> {
        let mut entries = self.entries.write();
        for (key, value) in writes {
            entries.insert(key, value);
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}
