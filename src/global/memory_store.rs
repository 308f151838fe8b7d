//! A process-local, optimistic-concurrency stand-in for the distributed
//! transactional store the spec assumes (§6). There is no real off-the-shelf
//! "replicated transactional KV store" crate in this pack to bind to, so this
//! gives `GlobalLockManager` something real to drive in tests and gives
//! embedders a reference for implementing [`GlobalStore`] against etcd,
//! FoundationDB, or similar.

use super::store::{GlobalRecord, GlobalStore, StoreError, Transaction};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Versioned {
    record: GlobalRecord,
    version: u64,
}

#[derive(Default)]
struct State {
    map: HashMap<String, Versioned>,
}

/// An in-memory `GlobalStore`. Commits detect write-write conflicts via a
/// per-key version counter rather than true isolation.
#[derive(Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl GlobalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(InMemoryTx {
            state: self.state.clone(),
            seen_versions: HashMap::new(),
            writes: HashMap::new(),
        }))
    }
}

enum PendingWrite {
    Put(GlobalRecord),
    Delete,
}

struct InMemoryTx {
    state: Arc<Mutex<State>>,
    seen_versions: HashMap<String, Option<u64>>,
    writes: HashMap<String, PendingWrite>,
}

impl InMemoryTx {
    fn live_record(state: &State, key: &str) -> Option<(GlobalRecord, u64)> {
        state.map.get(key).and_then(|v| {
            if v.record.expires_at_epoch_ms <= InMemoryStore::now_ms() {
                None
            } else {
                Some((v.record.clone(), v.version))
            }
        })
    }
}

#[async_trait]
impl Transaction for InMemoryTx {
    async fn read(&mut self, key: &str) -> Result<Option<GlobalRecord>, StoreError> {
        let state = self.state.lock().expect("memory store poisoned");
        match Self::live_record(&state, key) {
            Some((rec, version)) => {
                self.seen_versions
                    .entry(key.to_string())
                    .or_insert(Some(version));
                Ok(Some(rec))
            }
            None => {
                self.seen_versions.entry(key.to_string()).or_insert(None);
                Ok(None)
            }
        }
    }

    async fn write(&mut self, key: &str, record: GlobalRecord) -> Result<(), StoreError> {
        self.writes
            .insert(key.to_string(), PendingWrite::Put(record));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.writes.insert(key.to_string(), PendingWrite::Delete);
        Ok(())
    }

    async fn commit(&mut self) -> Result<super::store::TxResult, StoreError> {
        let mut state = self.state.lock().expect("memory store poisoned");
        for (key, seen) in &self.seen_versions {
            let current = Self::live_record(&state, key).map(|(_, v)| v);
            if current != *seen {
                return Ok(super::store::TxResult::Conflict);
            }
        }
        for (key, write) in self.writes.drain() {
            match write {
                PendingWrite::Put(record) => {
                    let next_version = state.map.get(&key).map(|v| v.version + 1).unwrap_or(0);
                    state.map.insert(
                        key,
                        Versioned {
                            record,
                            version: next_version,
                        },
                    );
                }
                PendingWrite::Delete => {
                    state.map.remove(&key);
                }
            }
        }
        Ok(super::store::TxResult::Committed)
    }

    async fn rollback(&mut self) {
        self.writes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::level::LockLevel;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.write(
            "p",
            GlobalRecord::new(LockLevel::Write, vec!["node-a".into()], i64::MAX),
        )
        .await
        .unwrap();
        assert_eq!(
            tx.commit().await.unwrap(),
            super::super::store::TxResult::Committed
        );

        let mut tx2 = store.begin().await.unwrap();
        let rec = tx2.read("p").await.unwrap().unwrap();
        assert_eq!(rec.owners, vec!["node-a".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_writers_detect_conflict() {
        let store = InMemoryStore::new();
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();

        let _ = tx1.read("p").await.unwrap();
        let _ = tx2.read("p").await.unwrap();

        tx1.write(
            "p",
            GlobalRecord::new(LockLevel::Write, vec!["a".into()], i64::MAX),
        )
        .await
        .unwrap();
        assert_eq!(
            tx1.commit().await.unwrap(),
            super::super::store::TxResult::Committed
        );

        tx2.write(
            "p",
            GlobalRecord::new(LockLevel::Write, vec!["b".into()], i64::MAX),
        )
        .await
        .unwrap();
        assert_eq!(
            tx2.commit().await.unwrap(),
            super::super::store::TxResult::Conflict
        );
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.write(
            "p",
            GlobalRecord::new(LockLevel::Write, vec!["a".into()], 1),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx2 = store.begin().await.unwrap();
        assert!(tx2.read("p").await.unwrap().is_none());
    }
}
