//! Partyline: concurrent file-lock coordination for many producers and
//! consumers sharing a file through a single process, with an optional
//! cluster-wide exclusion layer over a transactional key-value store.
//!
//! The two subsystems are [`lock`] (the local coordinator: [`lock::LockLevel`],
//! [`lock::LockOwner`], [`lock::JoinableFile`], [`lock::FileTree`], and the
//! [`lock::JoinableFileManager`] façade) and [`global`] (cluster-wide
//! exclusion via [`global::GlobalLockManager`] over a [`global::GlobalStore`]).
//! Command-line entry points, durable byte storage, and crash recovery of
//! in-progress writes are out of scope; this crate delegates them to its
//! caller.

pub mod err;
pub mod global;
pub mod lock;
pub mod util;

pub use err::{PartylineError, Result};
pub use global::{GlobalLockManager, GlobalStore, InMemoryStore};
pub use lock::{FileTree, JoinableFile, JoinableFileManager, LockLevel, LockOwner, OwnerId};
pub use util::PartylineConfig;
