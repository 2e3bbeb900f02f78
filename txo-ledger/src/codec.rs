//! Record codec
//!
//! Records are stored as compact JSON. Field order follows the struct
//! declaration order, so the same record always encodes to the same bytes:
//!
//! ```text
//! {"timestamp":0,"owner":"alice","id":"txo1","token":"cet","amount":"3","used_amount":"2","ref_list":null}
//! {"owner":"alice","token":"cet","txos":["txo1","txo2"]}
//! ```

use crate::{
    error::{Error, Result},
    types::{Txo, Wallet},
};
use serde::{de::DeserializeOwned, Serialize};

/// A record kind that can be persisted by the ledger store
pub trait Record: Serialize + DeserializeOwned {
    /// Short name used in errors and logs
    const KIND: &'static str;

    /// Shape checks that JSON decoding alone cannot express
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl Record for Txo {
    const KIND: &'static str = "txo";

    fn check(&self) -> std::result::Result<(), String> {
        if self.used_amount > self.amount {
            return Err(format!(
                "used_amount {} exceeds amount {}",
                self.used_amount, self.amount
            ));
        }
        Ok(())
    }
}

impl Record for Wallet {
    const KIND: &'static str = "wallet";
}

/// Encode a record to its canonical bytes
pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Decode a record, failing with [`Error::CorruptRecord`] on malformed bytes
pub fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    let record: R = serde_json::from_slice(bytes).map_err(|e| Error::CorruptRecord {
        kind: R::KIND,
        reason: e.to_string(),
    })?;

    record.check().map_err(|reason| Error::CorruptRecord {
        kind: R::KIND,
        reason,
    })?;

    Ok(record)
}
