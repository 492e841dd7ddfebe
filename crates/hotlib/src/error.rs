//! Error types for library loading, resolution and reload.

use std::path::PathBuf;

/// Errors produced by sessions and the registry.
///
/// `load` and construction-with-path return these directly. All other
/// operations report failure through their return value and record the
/// error in the session's single-slot diagnostic, readable via
/// `LibrarySession::last_error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LibraryError {
    /// The library file does not exist or cannot be opened.
    #[error("library path does not exist or is not accessible: {0}")]
    PathInvalid(PathBuf),

    /// The platform loader rejected the load.
    #[error("failed to load library '{path}': {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The platform loader rejected the unload. Recorded, never raised.
    #[error("failed to unload library '{path}': {reason}")]
    UnloadFailed { path: PathBuf, reason: String },

    /// The library does not export the requested symbol. Returned as an
    /// absent result, never raised.
    #[error("symbol '{name}' not found in library '{path}': {reason}")]
    SymbolNotFound {
        name: String,
        path: PathBuf,
        reason: String,
    },

    /// The reload-safety probe vetoed the reload.
    #[error("library '{0}' cannot be reloaded - reload capability not supported")]
    ReloadUnsupported(PathBuf),

    /// The load-after-unload step of the reload protocol failed.
    #[error("failed to reload library '{path}': {reason}")]
    ReloadFailed { path: PathBuf, reason: String },

    /// The operation requires a loaded library.
    #[error("no library loaded")]
    NotLoaded,
}

impl LibraryError {
    /// `true` for the kinds that `load` and construction-with-path raise.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::PathInvalid(_) | Self::LoadFailed { .. })
    }
}
