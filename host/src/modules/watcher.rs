//! Directory Watcher
//!
//! Turns filesystem notifications for the module directory into "rescan" signals.
//!
//! A subscription delivers at most one pending notification: the backend callback forwards into a
//! single-slot channel, and a full slot means a rescan is already due. After handing out an event
//! the watcher waits out the debounce window, drains whatever arrived meanwhile, and re-arms. A
//! polling interval backs the notifications up, so a notification lost between firing and
//! re-arming is made good by the next scan.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scan::is_module_file;
use crate::common::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Notified,
    Poll,
}

/// Something may have changed in the module directory.
///
/// `paths` is a hint only; consumers rescan the whole directory.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub reason: ChangeReason,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub extension: String,
    pub poll_interval: Duration,
    pub debounce: Duration,
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    debounce: Duration,
    // Dropping the backend ends the subscription.
    _backend: Option<RecommendedWatcher>,
    notifications: mpsc::Receiver<Vec<PathBuf>>,
    poll: Interval,
    cancel: CancellationToken,
}

impl DirectoryWatcher {
    /// Starts watching `dir`. Falls back to polling alone if notifications are unavailable.
    pub fn watch(dir: impl Into<PathBuf>, options: WatchOptions, cancel: CancellationToken) -> Self {
        let dir = dir.into();
        let (tx, notifications) = mpsc::channel(1);

        let backend = match subscribe(&dir, &options.extension, tx) {
            Ok(backend) => {
                info!("Watching {:?} for *.{} changes", dir, options.extension);
                Some(backend)
            }
            Err(e) => {
                warn!(
                    "{}; falling back to polling every {:?}",
                    e, options.poll_interval
                );
                None
            }
        };

        let mut poll = time::interval_at(Instant::now() + options.poll_interval, options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            dir,
            debounce: options.debounce,
            _backend: backend,
            notifications,
            poll,
            cancel,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Waits for the next change or for cancellation. Returns `None` once cancelled.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            Some(paths) = self.notifications.recv() => {
                debug!("Module directory notification: {:?}", paths);
                self.settle(paths).await?
            }
            _ = self.poll.tick() => ChangeEvent {
                reason: ChangeReason::Poll,
                paths: Vec::new(),
            },
        };

        // A rescan is about to happen either way; the backstop restarts from here.
        self.poll.reset();
        Some(event)
    }

    /// Debounces a notification and folds in everything that arrived during the window.
    async fn settle(&mut self, mut paths: Vec<PathBuf>) -> Option<ChangeEvent> {
        tokio::select! {
            _ = self.cancel.cancelled() => return None,
            _ = time::sleep(self.debounce) => {}
        }

        while let Ok(more) = self.notifications.try_recv() {
            paths.extend(more);
        }
        paths.sort();
        paths.dedup();

        Some(ChangeEvent {
            reason: ChangeReason::Notified,
            paths,
        })
    }
}

fn subscribe(
    dir: &Path,
    extension: &str,
    tx: mpsc::Sender<Vec<PathBuf>>,
) -> Result<RecommendedWatcher, WatchError> {
    let extension = extension.to_string();

    let mut backend = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        // Reads during reconciliation show up as access events; they never change a module.
        Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
        Ok(event) => {
            let paths: Vec<PathBuf> = event
                .paths
                .into_iter()
                .filter(|path| is_module_file(path, &extension))
                .collect();
            if !paths.is_empty() {
                // A full slot already holds a pending notification.
                let _ = tx.try_send(paths);
            }
        }
        Err(e) => warn!("Module watcher error: {}", e),
    })
    .map_err(|source| WatchError {
        path: dir.to_path_buf(),
        source,
    })?;

    backend
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError {
            path: dir.to_path_buf(),
            source,
        })?;

    Ok(backend)
}
