//! Error types for the Todo Store.
//!
//! Bootstrap failures ([`StoreError::PathResolution`], [`StoreError::StorageInit`],
//! [`StoreError::WatcherStart`]) leave the store unusable and abort
//! [`TodoStore::open`](crate::TodoStore::open). Every other variant is returned
//! from a single operation and leaves the store usable.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Every variant that concerns a file carries its path, since the caller has
/// no other way to tell which file failed after a switch.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The home directory could not be determined.
    #[error("failed to determine home directory")]
    PathResolution,

    /// The storage directory or default file could not be created.
    #[error("failed to prepare storage at {}: {source}", .path.display())]
    StorageInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The initial watch registration could not be created.
    #[error("failed to start watcher for {}: {source}", .path.display())]
    WatcherStart {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Reading the list failed.
    #[error("unable to open list: {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the list failed. Nothing was persisted.
    #[error("unable to save list: {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch on the previous path could not be removed. The previous path
    /// is still active.
    #[error("failed to stop watching {}: {source}", .path.display())]
    WatchDetach {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The watch on the new path could not be registered. The new path is
    /// active but unwatched.
    #[error("failed to watch {}: {source}", .path.display())]
    WatchAttach {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl StoreError {
    /// Returns `true` for errors that prevent the store from being used at all.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PathResolution | Self::StorageInit { .. } | Self::WatcherStart { .. }
        )
    }
}

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    fn not_found() -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, "file not found")
    }

    #[test]
    fn path_resolution_display() {
        let err = StoreError::PathResolution;
        assert_eq!(err.to_string(), "failed to determine home directory");
    }

    #[test]
    fn load_error_names_the_path() {
        let err = StoreError::Load {
            path: PathBuf::from("/home/user/.todos/todos.json"),
            source: not_found(),
        };
        assert_eq!(
            err.to_string(),
            "unable to open list: /home/user/.todos/todos.json: file not found"
        );
    }

    #[test]
    fn save_error_names_the_path() {
        let err = StoreError::Save {
            path: PathBuf::from("/tmp/export.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        assert_eq!(
            err.to_string(),
            "unable to save list: /tmp/export.json: access denied"
        );
    }

    #[test]
    fn watch_errors_display() {
        let err = StoreError::WatchAttach {
            path: PathBuf::from("/gone/todos.json"),
            source: notify::Error::path_not_found(),
        };
        assert!(err.to_string().starts_with("failed to watch /gone/todos.json"));

        let err = StoreError::WatchDetach {
            path: PathBuf::from("/old/todos.json"),
            source: notify::Error::watch_not_found(),
        };
        assert!(err
            .to_string()
            .starts_with("failed to stop watching /old/todos.json"));
    }

    #[test]
    fn fatal_classification() {
        assert!(StoreError::PathResolution.is_fatal());
        assert!(StoreError::StorageInit {
            path: PathBuf::from("/x"),
            source: not_found(),
        }
        .is_fatal());
        assert!(StoreError::WatcherStart {
            path: PathBuf::from("/x"),
            source: notify::Error::generic("inotify limit reached"),
        }
        .is_fatal());

        assert!(!StoreError::Load {
            path: PathBuf::from("/x"),
            source: not_found(),
        }
        .is_fatal());
        assert!(!StoreError::WatchAttach {
            path: PathBuf::from("/x"),
            source: notify::Error::path_not_found(),
        }
        .is_fatal());
    }

    #[test]
    fn error_source_chain() {
        let err = StoreError::StorageInit {
            path: PathBuf::from("/root/.todos"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };

        // Verify the error source chain is preserved
        let source = err.source();
        assert!(source.is_some());
    }
}
