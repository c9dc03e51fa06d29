//! Configuration for the Todo Store.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TODOS_DIR` | No | `~/.todos` | Directory holding `todos.json` |
//! | `TODOS_DEBOUNCE_MS` | No | 50 | Quiet period before a change is reported (0 disables coalescing) |
//! | `TODOS_NOTIFY_BUFFER` | No | 64 | Notification channel capacity |
//!
//! # Example
//!
//! ```no_run
//! use todo_store::config::StoreConfig;
//!
//! let config = StoreConfig::from_env().expect("Failed to load configuration");
//! println!("Debounce: {:?}", config.debounce);
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Default notification channel capacity.
pub const DEFAULT_NOTIFY_BUFFER: usize = 64;

/// Default storage directory name relative to home.
pub const DEFAULT_DIR_NAME: &str = ".todos";

/// Default list file name inside the storage directory.
pub const DEFAULT_FILE_NAME: &str = "todos.json";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for a [`TodoStore`](crate::TodoStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Overrides the storage directory. When `None`, `~/.todos` is used.
    pub root_dir: Option<PathBuf>,

    /// How long the active file must stay quiet before a change is reported.
    pub debounce: Duration,

    /// Capacity of the notification channel handed to the store by hosts.
    pub notify_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            notify_buffer: DEFAULT_NOTIFY_BUFFER,
        }
    }
}

impl StoreConfig {
    /// Creates a new `StoreConfig` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `TODOS_DEBOUNCE_MS` is set but is not a non-negative integer
    /// - `TODOS_NOTIFY_BUFFER` is set but is not a positive integer
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: TODOS_DIR (default: resolved from the home directory)
        let root_dir = env::var("TODOS_DIR")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from);

        // Optional: TODOS_DEBOUNCE_MS (default: 50)
        let debounce = match env::var("TODOS_DEBOUNCE_MS") {
            Ok(val) => {
                let ms = val
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "TODOS_DEBOUNCE_MS".to_string(),
                        message: format!("expected non-negative integer, got '{val}'"),
                    })?;
                Duration::from_millis(ms)
            }
            Err(_) => Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        };

        // Optional: TODOS_NOTIFY_BUFFER (default: 64, must be > 0)
        let notify_buffer = match env::var("TODOS_NOTIFY_BUFFER") {
            Ok(val) => {
                let size = val
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "TODOS_NOTIFY_BUFFER".to_string(),
                        message: format!("expected positive integer, got '{val}'"),
                    })?;
                if size == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "TODOS_NOTIFY_BUFFER".to_string(),
                        message: "buffer size must be greater than 0".to_string(),
                    });
                }
                size
            }
            Err(_) => DEFAULT_NOTIFY_BUFFER,
        };

        Ok(Self {
            root_dir,
            debounce,
            notify_buffer,
        })
    }

    /// Sets the storage directory override.
    #[must_use]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    /// Sets the debounce interval.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}
