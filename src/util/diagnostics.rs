//! A small async diagnostics channel, in the shape of the teacher's
//! `AsyncLogger` (`examples/hahatianx-lumo/src/utilities/logger.rs`): an
//! mpsc channel feeding a background task, rather than a mutex shared by
//! every caller. Unlike the teacher we sink into an in-memory ring buffer —
//! where the lines end up is the embedder's call, out of this crate's scope.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub ts_millis: i64,
}

impl Record {
    fn line(&self) -> String {
        let dt = chrono::DateTime::from_timestamp_millis(self.ts_millis).unwrap_or_else(Utc::now);
        format!(
            "{} [{}] {}",
            dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.level,
            self.message
        )
    }
}

enum Event {
    Record(Record),
    Shutdown,
}

/// Handle for emitting diagnostic events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    tx: mpsc::Sender<Event>,
}

impl Diagnostics {
    fn emit(&self, level: Level, msg: String) {
        let rec = Record {
            level,
            message: msg,
            ts_millis: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.tx.try_send(Event::Record(rec)) {
            eprintln!("partyline: diagnostics channel full, dropping event: {e}");
        }
    }

    pub fn trace(&self, msg: impl Into<String>) {
        self.emit(Level::Trace, msg.into());
    }
    pub fn debug(&self, msg: impl Into<String>) {
        self.emit(Level::Debug, msg.into());
    }
    pub fn info(&self, msg: impl Into<String>) {
        self.emit(Level::Info, msg.into());
    }
    pub fn warn(&self, msg: impl Into<String>) {
        self.emit(Level::Warn, msg.into());
    }
    pub fn error(&self, msg: impl Into<String>) {
        self.emit(Level::Error, msg.into());
    }

    /// Request the background task to flush and shut down.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown).await;
    }
}

/// The other half: a ring buffer the embedder can drain or mirror elsewhere.
#[derive(Clone)]
pub struct Sink {
    buf: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Sink {
    /// Snapshot of currently buffered lines, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut buf = self.buf.lock().expect("diagnostics sink poisoned");
        buf.drain(..).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Start a diagnostics channel with a bounded ring buffer of `capacity` lines.
pub fn start(capacity: usize) -> (Diagnostics, Sink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Event>(1024);
    let buf: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
    let sink = Sink {
        buf: buf.clone(),
        capacity,
    };

    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                Event::Record(rec) => {
                    let mut guard = buf.lock().expect("diagnostics sink poisoned");
                    if guard.len() >= capacity {
                        guard.pop_front();
                    }
                    guard.push_back(rec.line());
                }
                Event::Shutdown => break,
            }
        }
    });

    (Diagnostics { tx }, sink, task)
}
