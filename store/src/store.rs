//! The watched single-file store.
//!
//! [`TodoStore`] persists the todo list as an opaque byte payload in one file,
//! keeps a [`WatchRegistration`] on that file, and can be re-targeted to a
//! different file for import and export.
//!
//! # Consistency
//!
//! The active path and the watch registration live behind one mutex. A path
//! switch holds it for the whole detach/assign/attach sequence, so the
//! registration, when present, always watches the active path and concurrent
//! switches serialize. Load and save take the lock only long enough to copy
//! the active path.
//!
//! The payload is never cached: every load and save goes to the filesystem.
//!
//! # Example
//!
//! ```no_run
//! use todo_store::{Notification, StoreConfig, SystemPaths, TodoStore};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), todo_store::StoreError> {
//!     let (tx, mut rx) = mpsc::channel::<Notification>(64);
//!     let store = TodoStore::open(StoreConfig::default(), SystemPaths, tx)?;
//!
//!     store.save(br#"[{"title":"buy milk","done":false}]"#)?;
//!     while let Some(notification) = rx.recv().await {
//!         println!("{} -> {:?}", notification.event_name(), store.load()?);
//!     }
//!     Ok(())
//! }
//! ```

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::{StoreConfig, DEFAULT_DIR_NAME, DEFAULT_FILE_NAME};
use crate::error::{Result, StoreError};
use crate::paths::{self, PathProvider, JSON_FILTER};
use crate::types::{Notification, NotificationKind, NotificationSink};
use crate::watcher::WatchRegistration;

/// Payload written to a freshly created list file.
pub const EMPTY_LIST: &[u8] = b"[]";

/// Title of the export prompt.
pub const EXPORT_TITLE: &str = "Export file";

/// Title of the import prompt.
pub const IMPORT_TITLE: &str = "Import file";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// State guarded by the switch lock.
#[derive(Debug)]
struct Active {
    path: PathBuf,
    watch: Option<WatchRegistration>,
}

/// A todo list persisted to a single watched file.
pub struct TodoStore {
    root_dir: PathBuf,
    debounce: Duration,
    active: Mutex<Active>,
    paths: Box<dyn PathProvider>,
    sink: Arc<dyn NotificationSink>,
    runtime: Handle,
}

impl std::fmt::Debug for TodoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoStore")
            .field("root_dir", &self.root_dir)
            .field("debounce", &self.debounce)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl TodoStore {
    /// Opens the store: resolves the default path, makes sure the directory
    /// and list file exist, and starts watching.
    ///
    /// Must be called from within a Tokio runtime; the watcher's listening
    /// task runs on it.
    ///
    /// # Errors
    ///
    /// Returns one of the fatal variants:
    /// - [`StoreError::PathResolution`] if no home directory is available
    /// - [`StoreError::StorageInit`] if the directory or file cannot be created
    /// - [`StoreError::WatcherStart`] if there is no runtime or the watch fails
    pub fn open<P, S>(config: StoreConfig, paths: P, sink: S) -> Result<Self>
    where
        P: PathProvider,
        S: NotificationSink,
    {
        let (root_dir, path) = Self::resolve_default_path(&config, &paths)?;
        Self::ensure_storage_ready(&root_dir, &path)?;

        let runtime = Handle::try_current().map_err(|e| StoreError::WatcherStart {
            path: path.clone(),
            source: notify::Error::generic(&e.to_string()),
        })?;

        let store = Self {
            root_dir,
            debounce: config.debounce,
            active: Mutex::new(Active { path, watch: None }),
            paths: Box::new(paths),
            sink: Arc::new(sink),
            runtime,
        };
        store.start_watcher()?;

        Ok(store)
    }

    /// Derives the storage directory and default list path.
    ///
    /// Uses `config.root_dir` when set, otherwise `<home>/.todos`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PathResolution`] if the home directory is needed
    /// and cannot be determined.
    pub fn resolve_default_path(
        config: &StoreConfig,
        paths: &dyn PathProvider,
    ) -> Result<(PathBuf, PathBuf)> {
        let root_dir = match &config.root_dir {
            Some(dir) => dir.clone(),
            None => paths
                .home_dir()
                .ok_or(StoreError::PathResolution)?
                .join(DEFAULT_DIR_NAME),
        };
        let path = root_dir.join(DEFAULT_FILE_NAME);
        Ok((root_dir, path))
    }

    /// Creates `root_dir` and the list file at `path` if they are missing.
    ///
    /// An existing directory or file is left exactly as it is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StorageInit`] for any failure other than the
    /// target already existing.
    pub fn ensure_storage_ready(root_dir: &Path, path: &Path) -> Result<()> {
        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        match builder.create(root_dir) {
            Ok(()) => {
                // DirBuilder's mode is filtered through the umask
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(root_dir, fs::Permissions::from_mode(DIR_MODE)).map_err(
                        |source| StoreError::StorageInit {
                            path: root_dir.to_path_buf(),
                            source,
                        },
                    )?;
                }
                info!(dir = %root_dir.display(), "Created storage directory");
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(StoreError::StorageInit {
                    path: root_dir.to_path_buf(),
                    source: e,
                })
            }
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let created = options
            .open(path)
            .and_then(|mut file| file.write_all(EMPTY_LIST).and_then(|()| file.sync_all()));
        match created {
            Ok(()) => info!(path = %path.display(), "Created empty list"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Using existing list");
            }
            Err(e) => {
                return Err(StoreError::StorageInit {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }

        Ok(())
    }

    fn start_watcher(&self) -> Result<()> {
        let mut active = self.lock();
        info!(path = %active.path.display(), "Starting watcher");

        let watch = self
            .attach(&active.path)
            .map_err(|source| StoreError::WatcherStart {
                path: active.path.clone(),
                source,
            })?;
        active.watch = Some(watch);
        Ok(())
    }

    fn attach(&self, path: &Path) -> notify::Result<WatchRegistration> {
        WatchRegistration::attach(path, self.debounce, Arc::clone(&self.sink), &self.runtime)
    }

    fn lock(&self) -> MutexGuard<'_, Active> {
        // Every critical section leaves `Active` consistent before anything
        // that can panic, so a poisoned lock is still usable
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the storage directory resolved at open.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Returns the file currently read, written and watched.
    #[must_use]
    pub fn active_path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    /// Returns the path of the live watch registration, or `None` if the
    /// store is currently unwatched.
    #[must_use]
    pub fn watched_path(&self) -> Option<PathBuf> {
        self.lock().watch.as_ref().map(|w| w.path().to_path_buf())
    }

    /// Reads the whole payload of the active file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Load`] naming the active path if the read fails.
    pub fn load(&self) -> Result<Vec<u8>> {
        let path = self.active_path();
        info!(path = %path.display(), "Loading list");

        fs::read(&path).map_err(|source| {
            error!(path = %path.display(), error = %source, "Unable to open list");
            StoreError::Load { path, source }
        })
    }

    /// Reads the active file as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Same as [`TodoStore::load`].
    pub fn load_string(&self) -> Result<String> {
        self.load()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replaces the content of the active file with `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Save`] if the payload could not be persisted.
    pub fn save(&self, payload: &[u8]) -> Result<()> {
        let path = self.active_path();
        self.save_to(payload, &path)
    }

    /// Replaces the content of `path` with `payload`, creating it if needed.
    ///
    /// The payload goes to a temporary file in the same directory which is
    /// then renamed over `path`, so readers see either the old or the new
    /// content. The resulting file is readable and writable by its owner only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Save`] naming `path` on any I/O failure. Nothing
    /// is left behind in that case.
    pub fn save_to(&self, payload: &[u8], path: &Path) -> Result<()> {
        debug!(path = %path.display(), bytes = payload.len(), "Saving list");

        write_atomic(payload, path).map_err(|source| {
            error!(path = %path.display(), error = %source, "Unable to save list");
            StoreError::Save {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Makes `new_path` the active file and moves the watch onto it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::WatchDetach`]: the old watch could not be removed and
    ///   is still live. The old path stays active and keeps its registration.
    ///   A watch the OS already dropped (its directory was removed) does not
    ///   block the switch.
    /// - [`StoreError::WatchAttach`]: `new_path` is active but could not be
    ///   watched. The store is unwatched until the next successful switch,
    ///   and a [`NotificationKind::WatchLost`] is emitted.
    pub fn switch_path(&self, new_path: &Path) -> Result<()> {
        let mut active = self.lock();
        let old_path = active.path.clone();

        if let Some(watch) = active.watch.as_mut() {
            if let Err(source) = watch.detach() {
                if watch.is_live() {
                    error!(path = %old_path.display(), error = %source, "Failed to stop watching");
                    return Err(StoreError::WatchDetach {
                        path: old_path,
                        source,
                    });
                }
                warn!(path = %old_path.display(), error = %source, "Watch already gone");
            }
        }
        // Dropping the registration ends its listening task
        active.watch = None;
        active.path = new_path.to_path_buf();

        match self.attach(new_path) {
            Ok(watch) => {
                active.watch = Some(watch);
                drop(active);

                info!(
                    from = %old_path.display(),
                    to = %new_path.display(),
                    "Switched active list"
                );
                self.sink.emit(Notification::new(NotificationKind::PathSwitched {
                    from: old_path,
                    to: new_path.to_path_buf(),
                }));
                Ok(())
            }
            Err(source) => {
                drop(active);

                error!(path = %new_path.display(), error = %source, "Failed to watch new list");
                self.sink.emit(Notification::new(NotificationKind::WatchLost {
                    path: new_path.to_path_buf(),
                    reason: source.to_string(),
                }));
                Err(StoreError::WatchAttach {
                    path: new_path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Export flow: saves `payload` to a user-chosen file, then makes that
    /// file active.
    ///
    /// Returns the new path, or `None` if the user cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Save`] without switching if the payload could
    /// not be written, or any error from [`TodoStore::switch_path`].
    pub fn export(&self, payload: &[u8]) -> Result<Option<PathBuf>> {
        let Some(path) = paths::selected(self.paths.prompt_save_file(EXPORT_TITLE, JSON_FILTER))
        else {
            debug!("Export cancelled");
            return Ok(None);
        };
        info!(path = %path.display(), "Save as");

        self.save_to(payload, &path)?;
        self.switch_path(&path)?;
        Ok(Some(path))
    }

    /// Import flow: makes a user-chosen existing file active and emits
    /// [`NotificationKind::ContentChanged`] so the caller reloads it.
    ///
    /// Returns the new path, or `None` if the user cancelled, in which case
    /// nothing is switched and nothing is emitted.
    ///
    /// # Errors
    ///
    /// Any error from [`TodoStore::switch_path`]. No notification is emitted
    /// for the import in that case.
    pub fn import(&self) -> Result<Option<PathBuf>> {
        let Some(path) = paths::selected(self.paths.prompt_open_file(IMPORT_TITLE, JSON_FILTER))
        else {
            debug!("Import cancelled");
            return Ok(None);
        };
        info!(path = %path.display(), "Import");

        self.switch_path(&path)?;
        self.sink.emit(Notification::content_changed(path.clone()));
        Ok(Some(path))
    }

    /// Stops watching. Load and save keep working; no further notifications
    /// are produced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WatchDetach`] if the OS subscription could not be
    /// removed. The registration is released regardless.
    pub fn close(&self) -> Result<()> {
        let mut active = self.lock();
        let Some(mut watch) = active.watch.take() else {
            return Ok(());
        };
        info!(path = %watch.path().display(), "Stopping watcher");

        watch.detach().map_err(|source| {
            warn!(path = %active.path.display(), error = %source, "Watch already gone");
            StoreError::WatchDetach {
                path: active.path.clone(),
                source,
            }
        })
    }
}

/// Writes `payload` to a sibling temporary file and renames it over `path`.
fn write_atomic(payload: &[u8], path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(payload)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }

    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoHome;

    impl PathProvider for NoHome {
        fn home_dir(&self) -> Option<PathBuf> {
            None
        }
        fn prompt_save_file(&self, _: &str, _: &str) -> Option<PathBuf> {
            None
        }
        fn prompt_open_file(&self, _: &str, _: &str) -> Option<PathBuf> {
            None
        }
    }

    struct Home(PathBuf);

    impl PathProvider for Home {
        fn home_dir(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }
        fn prompt_save_file(&self, _: &str, _: &str) -> Option<PathBuf> {
            None
        }
        fn prompt_open_file(&self, _: &str, _: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_resolve_default_path_from_home() {
        let (root, path) =
            TodoStore::resolve_default_path(&StoreConfig::default(), &Home("/home/u".into()))
                .unwrap();
        assert_eq!(root, PathBuf::from("/home/u/.todos"));
        assert_eq!(path, PathBuf::from("/home/u/.todos/todos.json"));
    }

    #[test]
    fn test_resolve_default_path_without_home() {
        let err = TodoStore::resolve_default_path(&StoreConfig::default(), &NoHome).unwrap_err();
        assert!(matches!(err, StoreError::PathResolution));
    }

    #[test]
    fn test_root_dir_override_skips_home() {
        let config = StoreConfig::default().with_root_dir("/data/lists");
        let (root, path) = TodoStore::resolve_default_path(&config, &NoHome).unwrap();
        assert_eq!(root, PathBuf::from("/data/lists"));
        assert_eq!(path, PathBuf::from("/data/lists/todos.json"));
    }

    #[test]
    fn test_ensure_storage_ready_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(".todos");
        let path = root.join("todos.json");

        TodoStore::ensure_storage_ready(&root, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), EMPTY_LIST);

        fs::write(&path, b"[1]").unwrap();
        TodoStore::ensure_storage_ready(&root, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[1]");
    }

    #[test]
    fn test_ensure_storage_ready_reports_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("missing").join(".todos");
        let path = root.join("todos.json");

        let err = TodoStore::ensure_storage_ready(&root, &path).unwrap_err();
        assert!(matches!(err, StoreError::StorageInit { path: ref p, .. } if *p == root));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("list.json");

        write_atomic(b"[\"first\"]", &path).unwrap();
        write_atomic(b"[]", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");

        // Only the target remains, no temporaries
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope").join("list.json");
        assert!(write_atomic(b"[]", &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_open_requires_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel::<Notification>();
        let config = StoreConfig::default().with_root_dir(temp_dir.path().join(".todos"));

        let err = TodoStore::open(config, NoHome, tx).unwrap_err();
        assert!(matches!(err, StoreError::WatcherStart { .. }));
        assert!(err.is_fatal());
    }
}
