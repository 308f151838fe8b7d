//! Error taxonomy surfaced to callers (spec §7) plus an internal, file/line
//! tagged error for the `Fatal` variant, in the shape of the teacher's
//! `LumoError`.

use std::fmt::{Debug, Display, Formatter};

/// Boxed source error, kept `Send + Sync` so it can cross task boundaries.
pub type Source = Box<dyn std::error::Error + Send + Sync>;

/// Caller-facing outcome of an acquisition or stream operation.
#[derive(Debug)]
pub enum PartylineError {
    /// Deadline reached before admission.
    TimedOut,
    /// Compatibility matrix forbids admission; no progress without a release.
    Denied,
    /// Path does not exist and no `JoinableFile` is present (reads/deletes only).
    NotFound,
    /// Caller-initiated abort.
    Cancelled,
    /// Underlying file operation failed.
    Io(std::io::Error),
    /// Transactional support absent, or an invariant violation. Non-recoverable.
    Fatal(Located),
}

/// A `Fatal` message tagged with the call site that raised it, mirroring the
/// teacher's `LumoError`.
pub struct Located {
    message: String,
    file: &'static str,
    line: u32,
    source: Option<Source>,
}

impl Located {
    pub fn new(
        message: impl Into<String>,
        file: &'static str,
        line: u32,
        source: Option<Source>,
    ) -> Self {
        Self {
            message: message.into(),
            file,
            line,
            source,
        }
    }
}

impl Debug for Located {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.file, self.line, self.message)
    }
}

/// Construct a `PartylineError::Fatal` tagged with the call site.
#[macro_export]
macro_rules! partyline_error {
    ($fmt:expr $(, $($args:tt)*)?) => {
        $crate::err::PartylineError::Fatal($crate::err::Located::new(
            format!($fmt $(,$($args)*)?),
            file!(), line!(), None,
        ))
    };
}

impl Display for PartylineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PartylineError::TimedOut => write!(f, "timed out waiting for lock admission"),
            PartylineError::Denied => write!(f, "lock request denied by compatibility matrix"),
            PartylineError::NotFound => write!(f, "path not found"),
            PartylineError::Cancelled => write!(f, "operation cancelled"),
            PartylineError::Io(e) => write!(f, "io error: {e}"),
            PartylineError::Fatal(l) => write!(f, "fatal: [{}:{}] {}", l.file, l.line, l.message),
        }
    }
}

impl std::error::Error for PartylineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PartylineError::Io(e) => Some(e),
            PartylineError::Fatal(l) => l.source.as_deref().map(|e| e as &dyn std::error::Error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PartylineError {
    fn from(e: std::io::Error) -> Self {
        PartylineError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, PartylineError>;
