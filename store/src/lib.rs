//! Todo Store - watched single-file storage for a desktop todo list.
//!
//! This crate persists a todo list as an opaque payload in one file
//! (`~/.todos/todos.json` by default), watches that file for external edits,
//! and lets the host switch the active file for import and export.
//!
//! # Overview
//!
//! The host supplies two collaborators:
//!
//! - a [`PathProvider`] for the home directory and file dialogs
//! - a [`NotificationSink`] that receives [`Notification`]s
//!
//! and gets back a [`TodoStore`] whose `load`/`save` calls always go to disk.
//!
//! # Modules
//!
//! - [`store`]: The store itself: bootstrap, load/save, path switching
//! - [`watcher`]: Watch registration and its background task
//! - [`types`]: Notification types and the sink trait
//! - [`paths`]: Path provider trait and the system implementation
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for store operations

pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;
pub mod watcher;

pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use paths::{PathProvider, SystemPaths};
pub use store::TodoStore;
pub use types::{Notification, NotificationKind, NotificationSink};
pub use watcher::WatchRegistration;
