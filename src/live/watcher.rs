//! File-change notification.
//!
//! One polling task per watched path compares a cheap signature (modified
//! time plus length) on an interval and reports [`WatchEvent::Changed`] when
//! it moves, or [`WatchEvent::Removed`] when the path stops existing. A
//! removed path's task ends itself; the supervisor drops the watch on the
//! corresponding event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Content changed (or the path reappeared).
    Changed,
    /// The path no longer exists.
    Removed,
}

/// Set of per-path polling tasks feeding one event channel.
pub(crate) struct Watcher {
    interval: Duration,
    tx: UnboundedSender<(PathBuf, WatchEvent)>,
    tasks: HashMap<PathBuf, JoinHandle<()>>,
}

impl Watcher {
    pub(crate) fn new(interval: Duration) -> (Self, UnboundedReceiver<(PathBuf, WatchEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                interval,
                tx,
                tasks: HashMap::new(),
            },
            rx,
        )
    }

    pub(crate) fn watches(&self, path: &Path) -> bool {
        self.tasks.contains_key(path)
    }

    /// Start polling a path. Watching an already-watched path is a no-op.
    pub(crate) fn watch(&mut self, path: PathBuf) {
        if self.tasks.contains_key(&path) {
            return;
        }
        let task = tokio::spawn(poll(path.clone(), self.interval, self.tx.clone()));
        self.tasks.insert(path, task);
    }

    pub(crate) fn unwatch(&mut self, path: &Path) {
        if let Some(task) = self.tasks.remove(path) {
            task.abort();
        }
    }

    pub(crate) fn watched_paths(&self) -> Vec<PathBuf> {
        self.tasks.keys().cloned().collect()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}

type Signature = (SystemTime, u64);

async fn poll(path: PathBuf, interval: Duration, tx: UnboundedSender<(PathBuf, WatchEvent)>) {
    let mut last = signature(&path).await;

    loop {
        tokio::time::sleep(interval).await;
        let current = signature(&path).await;

        match (last, current) {
            (Some(_), None) => {
                let _ = tx.send((path.clone(), WatchEvent::Removed));
                return;
            }
            (Some(before), Some(after)) if before != after => {
                let _ = tx.send((path.clone(), WatchEvent::Changed));
            }
            (None, Some(_)) => {
                let _ = tx.send((path.clone(), WatchEvent::Changed));
            }
            _ => {}
        }
        last = current;
    }
}

async fn signature(path: &Path) -> Option<Signature> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    Some((modified, meta.len()))
}
