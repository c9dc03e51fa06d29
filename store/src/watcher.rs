//! File watcher for the active todo list.
//!
//! A [`WatchRegistration`] owns one [`notify`] watcher and one background task.
//! Dropping the registration drops the watcher, which closes the internal
//! channel and ends the task, so the task never outlives its registration.
//!
//! # Architecture
//!
//! The registration watches the *parent directory* of the list file
//! non-recursively and filters events down to the file's name. Watching the
//! file inode directly would go deaf after the first rename-over-write save
//! (our own atomic saves included), since the watched inode is replaced.
//!
//! The notify callback only classifies events and forwards them through a
//! bounded channel. The async task coalesces bursts of modify events and emits
//! one [`NotificationKind::ContentChanged`](crate::types::NotificationKind)
//! per burst once the file has been quiet for the configured debounce window.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{
    event::{ModifyKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::types::{Notification, NotificationSink};

/// Capacity of the channel between the notify thread and the listening task.
const INTERNAL_BUFFER: usize = 256;

/// A burst is reported after at most this many debounce windows, even if the
/// file never goes quiet.
const MAX_WAIT_FACTOR: u32 = 10;

/// Internal events from the notify callback, processed by the async task.
#[derive(Debug)]
enum InternalEvent {
    Modified,
    Failed(notify::Error),
}

/// A live watch on exactly one file.
#[derive(Debug)]
pub struct WatchRegistration {
    /// The watched file.
    path: PathBuf,

    /// The directory actually registered with the OS.
    dir: PathBuf,

    /// Kept alive to maintain the subscription. Owns the sending half of the
    /// internal channel.
    watcher: RecommendedWatcher,
}

impl WatchRegistration {
    /// Starts watching `path` and spawns the listening task on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist, the watcher cannot be
    /// created, or the parent directory cannot be registered.
    pub fn attach(
        path: &Path,
        debounce: Duration,
        sink: Arc<dyn NotificationSink>,
        runtime: &Handle,
    ) -> notify::Result<Self> {
        // A directory watch would happily succeed for a file that vanished
        fs::metadata(path).map_err(|e| notify::Error::io(e).add_path(path.to_path_buf()))?;

        let dir = parent_dir(path);
        let file_name = path
            .file_name()
            .map(OsStr::to_os_string)
            .ok_or_else(|| notify::Error::path_not_found().add_path(path.to_path_buf()))?;

        let (internal_tx, internal_rx) = mpsc::channel::<InternalEvent>(INTERNAL_BUFFER);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                handle_notify_event(res, &file_name, &internal_tx);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        runtime.spawn(listen(internal_rx, path.to_path_buf(), debounce, sink));

        info!(
            path = %path.display(),
            watch_dir = %dir.display(),
            "Now watching"
        );

        Ok(Self {
            path: path.to_path_buf(),
            dir,
            watcher,
        })
    }

    /// Removes the OS subscription.
    ///
    /// On error the registration is untouched and may still be live. On
    /// success the registration should be dropped, which ends the task.
    pub fn detach(&mut self) -> notify::Result<()> {
        self.watcher.unwatch(&self.dir)?;
        debug!(path = %self.path.display(), "Stopped watching");
        Ok(())
    }

    /// Returns the watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `false` once the OS has dropped the subscription because the
    /// watched directory no longer exists.
    ///
    /// A failed [`detach`](Self::detach) on a registration that is not live
    /// leaves nothing behind to clean up.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.dir.is_dir()
    }
}

/// Returns the directory to register for `path`.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Handles events from the notify crate.
///
/// Runs on notify's thread, so it only classifies and forwards.
fn handle_notify_event(
    res: notify::Result<Event>,
    file_name: &OsString,
    internal_tx: &mpsc::Sender<InternalEvent>,
) {
    let internal_event = match res {
        Ok(event) => {
            trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");
            if !touches_file(&event, file_name) {
                return;
            }
            InternalEvent::Modified
        }
        Err(e) => InternalEvent::Failed(e),
    };

    // try_send so the OS watcher thread never blocks; dropping a modify event
    // is harmless while another one is already queued
    if let Err(e) = internal_tx.try_send(internal_event) {
        warn!(error = %e, "Failed to queue internal event, channel may be full");
    }
}

/// Returns `true` if `event` is a modify-like event for `file_name`.
///
/// Data writes, creation, and renames onto the file all count. Metadata
/// changes, reads, removals, and renames away from the file do not.
fn touches_file(event: &Event, file_name: &OsStr) -> bool {
    let is_target = |p: &PathBuf| p.file_name() == Some(file_name);

    match event.kind {
        // paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1).is_some_and(is_target)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any))
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other)
        | EventKind::Create(_) => event.paths.iter().any(is_target),
        _ => {
            trace!(kind = ?event.kind, "Ignoring event kind");
            false
        }
    }
}

/// The listening task.
///
/// Ends when the internal channel closes, i.e. when the registration's watcher
/// is dropped. A change still waiting out its debounce window is reported
/// before exiting. A file that keeps changing is still reported once every
/// `MAX_WAIT_FACTOR` debounce windows.
async fn listen(
    mut rx: mpsc::Receiver<InternalEvent>,
    path: PathBuf,
    debounce: Duration,
    sink: Arc<dyn NotificationSink>,
) {
    let max_wait = debounce * MAX_WAIT_FACTOR;
    let mut deadline: Option<Instant> = None;
    let mut burst_start: Option<Instant> = None;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(InternalEvent::Modified) => {
                    trace!(path = %path.display(), "Modification queued");
                    let now = Instant::now();
                    let start = *burst_start.get_or_insert(now);
                    deadline = Some((now + debounce).min(start + max_wait));
                }
                Some(InternalEvent::Failed(e)) => {
                    error!(path = %path.display(), error = %e, "File watcher error");
                }
                None => break,
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                burst_start = None;
                report_change(&path, sink.as_ref());
            }
        }
    }

    if deadline.is_some() {
        report_change(&path, sink.as_ref());
    }

    debug!(path = %path.display(), "Watch task shutting down");
}

fn report_change(path: &Path, sink: &dyn NotificationSink) {
    info!(path = %path.display(), "Modified file");
    sink.emit(Notification::content_changed(path));
}
