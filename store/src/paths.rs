//! Path resolution collaborator.
//!
//! The store asks a [`PathProvider`] for the home directory at bootstrap and
//! for user-chosen files during import and export. Dialogs belong to the host,
//! so the provider is injected rather than reached through global state.

use std::path::PathBuf;

use directories::BaseDirs;

/// File filter passed to import/export prompts.
pub const JSON_FILTER: &str = "*.json";

/// Supplies the home directory and user-selected file paths.
pub trait PathProvider: Send + Sync + 'static {
    /// Returns the current user's home directory, if it can be determined.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Asks the user for a file to write to. `None` means the user cancelled.
    fn prompt_save_file(&self, title: &str, filter: &str) -> Option<PathBuf>;

    /// Asks the user for an existing file to read. `None` means the user
    /// cancelled.
    fn prompt_open_file(&self, title: &str, filter: &str) -> Option<PathBuf>;
}

/// Provider backed by the platform's user directories.
///
/// Has no dialog subsystem, so every prompt reports a cancel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPaths;

impl PathProvider for SystemPaths {
    fn home_dir(&self) -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn prompt_save_file(&self, _title: &str, _filter: &str) -> Option<PathBuf> {
        None
    }

    fn prompt_open_file(&self, _title: &str, _filter: &str) -> Option<PathBuf> {
        None
    }
}

/// Treats an empty selection the same as a cancelled one.
///
/// Dialog toolkits commonly report a cancel as an empty string.
pub(crate) fn selected(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_paths_never_prompts() {
        let paths = SystemPaths;
        assert!(paths.prompt_open_file("Import file", JSON_FILTER).is_none());
        assert!(paths.prompt_save_file("Export file", JSON_FILTER).is_none());
    }

    #[test]
    fn empty_selection_is_cancel() {
        assert_eq!(selected(Some(PathBuf::new())), None);
        assert_eq!(selected(None), None);
        assert_eq!(
            selected(Some(PathBuf::from("/tmp/list.json"))),
            Some(PathBuf::from("/tmp/list.json"))
        );
    }
}
