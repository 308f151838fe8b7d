//! JoinableFileManager (spec §4.4): the façade tying [`FileTree`] and the
//! optional [`GlobalLockManager`] together behind `openOutputStream`,
//! `openInputStream`, `tryDelete`, and `waitFor`.
//!
//! Byte persistence is explicitly a collaborator's concern (spec §1), so
//! reading a path with no in-process `JoinableFile` is delegated to an
//! injectable [`FileBackend`]; the default backend reports everything as
//! absent, matching a pure in-memory deployment.

use crate::err::{PartylineError, Result};
use crate::global::GlobalLockManager;
use crate::lock::file_tree::{AcquireError, FileTree};
use crate::lock::joinable_file::{JoinableFile, ReaderCursor};
use crate::lock::level::LockLevel;
use crate::lock::owner::OwnerId;
use crate::util::{Diagnostics, PartylineConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::sync::Notify;

/// A cooperative cancellation signal (spec §5): a caller holding one may
/// abort an in-flight acquisition, which always unwinds cleanly.
#[derive(Clone)]
pub struct CancelToken(Arc<(AtomicBool, Notify)>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new((AtomicBool::new(false), Notify::new())))
    }

    pub fn cancel(&self) {
        self.0.0.store(true, Ordering::SeqCst);
        self.0.1.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.0.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0.1.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte storage collaborator (spec §1): resolves an `openInputStream` against
/// a path with no live `JoinableFile`.
#[async_trait]
pub trait FileBackend: Send + Sync {
    async fn open_reader(
        &self,
        path: &Path,
    ) -> std::io::Result<Option<Box<dyn AsyncRead + Unpin + Send>>>;
}

/// Reports every path absent: correct for a deployment with no durable
/// backing store, and the default when none is configured.
pub struct NullBackend;

#[async_trait]
impl FileBackend for NullBackend {
    async fn open_reader(
        &self,
        _path: &Path,
    ) -> std::io::Result<Option<Box<dyn AsyncRead + Unpin + Send>>> {
        Ok(None)
    }
}

pub struct JoinableFileManager {
    tree: Arc<FileTree>,
    global: Option<Arc<GlobalLockManager>>,
    backend: Arc<dyn FileBackend>,
    diagnostics: Option<Diagnostics>,
}

impl JoinableFileManager {
    pub fn new(_config: PartylineConfig) -> Self {
        Self {
            tree: Arc::new(FileTree::new()),
            global: None,
            backend: Arc::new(NullBackend),
            diagnostics: None,
        }
    }

    pub fn with_global(mut self, global: Arc<GlobalLockManager>) -> Self {
        self.global = Some(global);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn FileBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    fn log_info(&self, msg: impl Into<String>) {
        if let Some(d) = &self.diagnostics {
            d.info(msg);
        }
    }

    fn log_warn(&self, msg: impl Into<String>) {
        if let Some(d) = &self.diagnostics {
            d.warn(msg);
        }
    }

    /// Acquires global then local Write; the returned stream releases in the
    /// reverse order on close (spec §4.4).
    pub async fn open_output_stream(
        &self,
        path: &Path,
        owner: &OwnerId,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<OutputStream> {
        let deadline = Instant::now() + timeout;
        let key = normalize(path);

        let took_global = self
            .acquire_global(&key, LockLevel::Write, deadline, cancel)
            .await?;

        let file = match self
            .race_local_acquire(&key, LockLevel::Write, owner, deadline, cancel)
            .await
        {
            Ok(Some(file)) => file,
            Ok(None) => unreachable!("Write admission always yields a JoinableFile"),
            Err(e) => {
                self.log_warn(format!(
                    "open_output_stream({}): local write denied: {e}",
                    key.display()
                ));
                if took_global {
                    self.release_global(&key, LockLevel::Write).await;
                }
                return Err(e);
            }
        };

        self.log_info(format!(
            "open_output_stream({}): admitted writer {}",
            key.display(),
            owner.name
        ));
        Ok(OutputStream {
            path: key,
            owner_name: owner.name.clone(),
            file,
            tree: self.tree.clone(),
            global: if took_global {
                self.global.clone()
            } else {
                None
            },
            released: false,
        })
    }

    /// Joins an in-progress write's `JoinableFile` under a local Read lock, or
    /// falls back to the configured [`FileBackend`] (spec §4.4).
    pub async fn open_input_stream(
        &self,
        path: &Path,
        owner: &OwnerId,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<InputStream> {
        let deadline = Instant::now() + timeout;
        let key = normalize(path);

        // An admitted Read with no JoinableFile still installs a FileTree
        // entry (§4.2), so even the fallback-to-backend path must release it.
        let took_local_read = match self
            .race_local_acquire(&key, LockLevel::Read, owner, deadline, cancel)
            .await
        {
            Ok(Some(file)) => {
                let cursor = file
                    .open_reader(0)
                    .await
                    .map_err(|_| PartylineError::Denied)?;
                return Ok(InputStream::Joined {
                    path: key,
                    owner_name: owner.name.clone(),
                    cursor,
                    tree: self.tree.clone(),
                    released: false,
                });
            }
            Ok(None) => true,
            Err(PartylineError::Denied) => false,
            Err(e) => return Err(e),
        };

        let took_global = match self
            .acquire_global(&key, LockLevel::Read, deadline, cancel)
            .await
        {
            Ok(took_global) => took_global,
            Err(e) => {
                if took_local_read {
                    self.tree.release(&key, &owner.name).await;
                }
                return Err(e);
            }
        };
        match self.backend.open_reader(&key).await {
            Ok(Some(reader)) => Ok(InputStream::Backend {
                reader,
                global: if took_global {
                    self.global.clone()
                } else {
                    None
                },
                tree: if took_local_read {
                    Some(self.tree.clone())
                } else {
                    None
                },
                owner_name: owner.name.clone(),
                path: key,
                released: false,
            }),
            Ok(None) => {
                if took_global {
                    self.release_global(&key, LockLevel::Read).await;
                }
                if took_local_read {
                    self.tree.release(&key, &owner.name).await;
                }
                self.log_info(format!("open_input_stream({}): not found", key.display()));
                Err(PartylineError::NotFound)
            }
            Err(e) => {
                if took_global {
                    self.release_global(&key, LockLevel::Read).await;
                }
                if took_local_read {
                    self.tree.release(&key, &owner.name).await;
                }
                self.log_warn(format!(
                    "open_input_stream({}): backend io error: {e}",
                    key.display()
                ));
                Err(PartylineError::Io(e))
            }
        }
    }

    /// Deletes `path`: absent paths succeed idempotently (spec §9 open
    /// question, resolved in favor of success).
    pub async fn try_delete(
        &self,
        path: &Path,
        owner: &OwnerId,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let key = normalize(path);

        let took_global = self
            .acquire_global(&key, LockLevel::Delete, deadline, cancel)
            .await?;

        let result = self
            .race_local_acquire(&key, LockLevel::Delete, owner, deadline, cancel)
            .await;
        let outcome = match result {
            Ok(_) => {
                self.tree.release(&key, &owner.name).await;
                self.log_info(format!("try_delete({}): deleted", key.display()));
                Ok(true)
            }
            Err(e) => {
                self.log_warn(format!("try_delete({}): {e}", key.display()));
                Err(e)
            }
        };

        if took_global {
            self.release_global(&key, LockLevel::Delete).await;
        }
        outcome
    }

    async fn release_global(&self, path: &Path, level: LockLevel) {
        if let Some(global) = &self.global {
            global.unlock(&key_str(path), level).await.ok();
        }
    }

    pub async fn wait_for(&self, path: &Path, level: LockLevel, timeout: Duration) -> bool {
        let key = normalize(path);
        self.tree
            .wait_for(&key, level, Instant::now() + timeout)
            .await
    }

    pub async fn lock_info(&self, path: &Path) -> Option<String> {
        let key = normalize(path);
        self.tree.lock_info(&key).await.map(|info| {
            format!(
                "{:?} held by {} reference(s): {:?}",
                info.level, info.count, info.references
            )
        })
    }

    async fn race_local_acquire(
        &self,
        path: &Path,
        level: LockLevel,
        owner: &OwnerId,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<Option<Arc<JoinableFile>>> {
        tokio::select! {
            res = self.tree.acquire(path, level, owner, deadline) => res.map_err(|e| match e {
                AcquireError::TimedOut => PartylineError::TimedOut,
                AcquireError::Denied => PartylineError::Denied,
            }),
            _ = cancel.cancelled() => Err(PartylineError::Cancelled),
        }
    }

    async fn acquire_global(
        &self,
        path: &Path,
        level: LockLevel,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<bool> {
        let Some(global) = &self.global else {
            return Ok(false);
        };
        let timeout = deadline.saturating_duration_since(Instant::now());
        let path_key = key_str(path);
        let admitted = tokio::select! {
            res = global.try_lock(&path_key, level, timeout) => res?,
            _ = cancel.cancelled() => return Err(PartylineError::Cancelled),
        };
        if admitted {
            Ok(true)
        } else {
            Err(PartylineError::TimedOut)
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.to_path_buf()
}

fn key_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A write handle returned by `open_output_stream`. Releases its local then
/// global hold exactly once, on `close`.
pub struct OutputStream {
    path: PathBuf,
    owner_name: String,
    file: Arc<JoinableFile>,
    tree: Arc<FileTree>,
    global: Option<Arc<GlobalLockManager>>,
    released: bool,
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

impl OutputStream {
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.file
            .write(bytes)
            .await
            .map_err(|_| PartylineError::Io(std::io::Error::other("joinable file write rejected")))
    }

    /// Closes the write (freezing `written`), then releases local and global
    /// locks in that order (spec §4.4).
    pub async fn close(&mut self) {
        if self.released {
            return;
        }
        self.file.close().await;
        self.tree.release(&self.path, &self.owner_name).await;
        if let Some(global) = &self.global {
            global
                .unlock(&key_str(&self.path), LockLevel::Write)
                .await
                .ok();
        }
        self.released = true;
    }
}

/// A read handle returned by `open_input_stream`: either joined to a live
/// `JoinableFile`, or backed by the configured [`FileBackend`].
pub enum InputStream {
    Joined {
        path: PathBuf,
        owner_name: String,
        cursor: ReaderCursor,
        tree: Arc<FileTree>,
        released: bool,
    },
    Backend {
        reader: Box<dyn AsyncRead + Unpin + Send>,
        global: Option<Arc<GlobalLockManager>>,
        tree: Option<Arc<FileTree>>,
        owner_name: String,
        path: PathBuf,
        released: bool,
    },
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputStream::Joined { path, .. } => f
                .debug_struct("InputStream::Joined")
                .field("path", path)
                .finish(),
            InputStream::Backend { path, .. } => f
                .debug_struct("InputStream::Backend")
                .field("path", path)
                .finish(),
        }
    }
}

impl InputStream {
    /// Reads the next chunk, or `None` at end-of-stream.
    pub async fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            InputStream::Joined { cursor, .. } => cursor.read_next().await.map_err(|_| {
                PartylineError::Io(std::io::Error::other("joinable file read failed"))
            }),
            InputStream::Backend { reader, .. } => {
                use tokio::io::AsyncReadExt;
                let mut buf = vec![0u8; 8192];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    buf.truncate(n);
                    Ok(Some(buf))
                }
            }
        }
    }

    /// Releases the local Read lock (joined streams) or the global Read lock
    /// (backend streams). Idempotent.
    pub async fn close(&mut self) {
        match self {
            InputStream::Joined {
                path,
                owner_name,
                tree,
                released,
                ..
            } => {
                if !*released {
                    tree.release(path, owner_name).await;
                    *released = true;
                }
            }
            InputStream::Backend {
                global,
                tree,
                owner_name,
                path,
                released,
                ..
            } => {
                if *released {
                    return;
                }
                if let Some(global) = global.take() {
                    global.unlock(&key_str(path), LockLevel::Read).await.ok();
                }
                if let Some(tree) = tree.take() {
                    tree.release(path, owner_name).await;
                }
                *released = true;
            }
        }
    }
}
