//! LockOwner (spec §4.1): the per-path reference-count record.
//!
//! The Java original keyed references by thread name and kept a weak
//! reference to the thread for diagnostics. Per the redesign note in spec §9
//! we drop the thread reference and model the holder as an opaque
//! [`OwnerId`] the caller supplies (defaulting to the current thread's name,
//! since Tokio tasks don't have one of their own).

use crate::lock::level::LockLevel;

/// Identifies a lock holder. Carries a name (used for re-lock idempotence
/// and removal) and a human-readable label for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId {
    pub name: String,
    pub label: String,
}

impl OwnerId {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }

    /// Default owner identity: current thread's name, or a generic fallback
    /// (Tokio worker threads are typically unnamed).
    pub fn current() -> Self {
        let name = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| "anonymous".to_string());
        Self::new(name.clone(), name)
    }
}

/// A point-in-time diagnostic snapshot of a [`LockOwner`] (spec §4.1 `lockInfo`).
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub level: LockLevel,
    pub count: usize,
    pub references: Vec<(String, String)>,
}

/// Per-path record tracking who holds a path's lock and at what level.
///
/// `level` is fixed for the owner's lifetime (invariant, spec §3). The
/// reference list preserves insertion order so diagnostics are reproducible;
/// a duplicate `name` overwrites its label rather than adding a second entry
/// (idempotent re-lock from the same named holder).
#[derive(Debug)]
pub struct LockOwner {
    level: LockLevel,
    // Ordered (name, label) pairs; small N expected, so linear scans are fine.
    refs: Vec<(String, String)>,
}

impl LockOwner {
    /// Creates a new owner with a single initial reference.
    pub fn new(owner: &OwnerId, level: LockLevel) -> Self {
        Self {
            level,
            refs: vec![(owner.name.clone(), owner.label.clone())],
        }
    }

    pub fn level(&self) -> LockLevel {
        self.level
    }

    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.refs.is_empty()
    }

    /// Attempts to admit `owner` at `requested`. Admits only if `requested`
    /// is `Read` and this owner's level is `Read` or `Write` (§4.1). Never
    /// fails outright; rejects by returning `false`.
    pub fn lock(&mut self, owner: &OwnerId, requested: LockLevel) -> bool {
        if requested != LockLevel::Read || !self.level.admits(LockLevel::Read) {
            return false;
        }
        if let Some(entry) = self.refs.iter_mut().find(|(n, _)| n == &owner.name) {
            entry.1 = owner.label.clone();
        } else {
            self.refs.push((owner.name.clone(), owner.label.clone()));
        }
        true
    }

    /// Removes the reference held by `name`. Returns `true` exactly when the
    /// last reference has been removed (the owner is now terminal).
    pub fn unlock(&mut self, name: &str) -> bool {
        if let Some(idx) = self.refs.iter().position(|(n, _)| n == name) {
            self.refs.remove(idx);
        }
        self.refs.is_empty()
    }

    pub fn lock_info(&self) -> LockInfo {
        LockInfo {
            level: self.level,
            count: self.refs.len(),
            references: self.refs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_owner_holds_one_reference() {
        let owner = OwnerId::new("w1", "writer-1");
        let lo = LockOwner::new(&owner, LockLevel::Write);
        assert_eq!(lo.ref_count(), 1);
        assert!(!lo.is_terminal());
        assert_eq!(lo.level(), LockLevel::Write);
    }

    #[test]
    fn write_owner_admits_read_joiners_only() {
        let w = OwnerId::new("w1", "writer");
        let mut lo = LockOwner::new(&w, LockLevel::Write);

        let r1 = OwnerId::new("r1", "reader-1");
        assert!(lo.lock(&r1, LockLevel::Read));
        assert_eq!(lo.ref_count(), 2);

        let r2 = OwnerId::new("r2", "reader-2");
        assert!(!lo.lock(&r2, LockLevel::Write));
        assert!(!lo.lock(&r2, LockLevel::Delete));
        assert_eq!(lo.ref_count(), 2);
    }

    #[test]
    fn read_owner_rejects_write_and_delete_but_admits_read() {
        let r0 = OwnerId::new("r0", "reader-0");
        let mut lo = LockOwner::new(&r0, LockLevel::Read);
        assert!(lo.lock(&OwnerId::new("r1", "reader-1"), LockLevel::Read));
        assert!(!lo.lock(&OwnerId::new("w1", "writer-1"), LockLevel::Write));
        assert!(!lo.lock(&OwnerId::new("d1", "deleter-1"), LockLevel::Delete));
    }

    #[test]
    fn duplicate_name_overwrites_label_idempotently() {
        let w = OwnerId::new("w1", "writer");
        let mut lo = LockOwner::new(&w, LockLevel::Write);
        let r1a = OwnerId::new("r1", "reader-first-label");
        assert!(lo.lock(&r1a, LockLevel::Read));
        let r1b = OwnerId::new("r1", "reader-second-label");
        assert!(lo.lock(&r1b, LockLevel::Read));

        assert_eq!(lo.ref_count(), 2);
        let info = lo.lock_info();
        let (_, label) = info.references.iter().find(|(n, _)| n == "r1").unwrap();
        assert_eq!(label, "reader-second-label");
    }

    #[test]
    fn unlock_reports_terminal_exactly_when_empty() {
        let w = OwnerId::new("w1", "writer");
        let mut lo = LockOwner::new(&w, LockLevel::Write);
        lo.lock(&OwnerId::new("r1", "reader-1"), LockLevel::Read);

        assert!(!lo.unlock("w1"));
        assert!(lo.unlock("r1"));
        assert!(lo.is_terminal());
    }

    #[test]
    fn unlock_unknown_name_is_a_noop() {
        let w = OwnerId::new("w1", "writer");
        let mut lo = LockOwner::new(&w, LockLevel::Write);
        assert!(!lo.unlock("nobody"));
        assert_eq!(lo.ref_count(), 1);
    }
}
