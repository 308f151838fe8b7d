//! The transactional, replicated key-value store contract GlobalLockManager
//! consumes (spec §6). Values are `GlobalRecord`s keyed by path, with a
//! coarse TTL honored by the store itself.

use crate::lock::level::LockLevel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A `GlobalLockOwner` entry (spec §3): the level held and the node-ids
/// holding it, plus an absolute expiry the store enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub level: LockLevel,
    pub owners: Vec<String>,
    pub expires_at_epoch_ms: i64,
}

impl GlobalRecord {
    pub fn new(level: LockLevel, owners: Vec<String>, expires_at_epoch_ms: i64) -> Self {
        Self {
            level,
            owners,
            expires_at_epoch_ms,
        }
    }
}

/// Outcome of a transaction commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxResult {
    Committed,
    /// Another transaction raced this one; the attempt should be retried.
    Conflict,
}

/// Store-level failures. `Unsupported` is the "no transactional support"
/// case spec §4.5/§7 calls out as fatal and non-retryable; everything else
/// is assumed retryable by the caller.
#[derive(Debug, Clone)]
pub enum StoreError {
    Unsupported(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unsupported(m) => write!(f, "store does not support transactions: {m}"),
            StoreError::Io(m) => write!(f, "store io error: {m}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A single transaction: read/write/delete keys, then commit or roll back.
#[async_trait]
pub trait Transaction: Send {
    async fn read(&mut self, key: &str) -> Result<Option<GlobalRecord>, StoreError>;
    async fn write(&mut self, key: &str, record: GlobalRecord) -> Result<(), StoreError>;
    async fn delete(&mut self, key: &str) -> Result<(), StoreError>;
    async fn commit(&mut self) -> Result<TxResult, StoreError>;
    async fn rollback(&mut self);
}

/// A transactional, replicated key-value store.
#[async_trait]
pub trait GlobalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}
