//! The local file-lock coordinator (spec §4.1-§4.4): per-path lock ownership,
//! the joinable write/read stream, the registry, and the façade.

pub mod file_tree;
pub mod joinable_file;
pub mod level;
pub mod manager;
pub mod owner;

pub use file_tree::{AcquireError, FileTree};
pub use joinable_file::{FileState, JoinError, JoinableFile, ReaderCursor};
pub use level::LockLevel;
pub use manager::{
    CancelToken, FileBackend, InputStream, JoinableFileManager, NullBackend, OutputStream,
};
pub use owner::{LockInfo, LockOwner, OwnerId};
