//! LockLevel and the admission compatibility matrix (spec §3).

/// The three lock levels a caller may request, ordered `Read < Write < Delete`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LockLevel {
    Read,
    Write,
    Delete,
}

impl LockLevel {
    /// Whether a holder at `self` admits a new request at `requested`,
    /// per the matrix in spec §3. `Write` additionally admits `Read`
    /// joiners because the local coordinator exposes a joined read stream
    /// over an ongoing write (§4.3).
    pub fn admits(self, requested: LockLevel) -> bool {
        matches!(
            (self, requested),
            (LockLevel::Read, LockLevel::Read) | (LockLevel::Write, LockLevel::Read)
        )
    }
}
