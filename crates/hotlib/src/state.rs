//! Session lifecycle state and the lazy reload-capability verdict.

use serde::{Deserialize, Serialize};

/// Per-session policy: whether symbol resolution and `touch` transparently
/// check for a newer on-disk file and reload before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoReload {
    /// Never reload implicitly.
    #[default]
    Disabled,
    /// Reload before resolving when the file on disk is newer.
    Enabled,
}

/// Observable lifecycle state of a session.
///
/// `Unloading` and `Reloading` are transient states of the reload protocol;
/// `Failed` persists after a reload whose re-load step failed, until a
/// subsequent explicit `load` recovers the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No library loaded.
    #[default]
    Unloaded,
    /// A library is loaded and usable.
    Loaded,
    /// Unload in progress.
    Unloading,
    /// Reload protocol in progress.
    Reloading,
    /// Reload lost the library; equivalent to never-loaded.
    Failed(String),
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Unloaded => write!(f, "Unloaded"),
            SessionStatus::Loaded => write!(f, "Loaded"),
            SessionStatus::Unloading => write!(f, "Unloading"),
            SessionStatus::Reloading => write!(f, "Reloading"),
            SessionStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

/// Lazily evaluated reload-capability verdict, memoized per handle
/// generation.
///
/// Probing performs a real load/unload cycle and is not free, so the
/// verdict is computed at most once per generation. Every successful load
/// or reload resets it to `Untested`: a stale verdict could mask a problem
/// the new generation introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    /// Not probed for the current handle generation.
    #[default]
    Untested,
    /// Cached verdict for the current handle generation.
    Tested(bool),
}

impl ProbeState {
    /// The cached verdict, if one exists for this generation.
    pub fn verdict(&self) -> Option<bool> {
        match self {
            ProbeState::Untested => None,
            ProbeState::Tested(v) => Some(*v),
        }
    }

    /// Forget the verdict; the next query re-probes.
    pub fn reset(&mut self) {
        *self = ProbeState::Untested;
    }

    /// Cache a verdict and return it.
    pub fn record(&mut self, verdict: bool) -> bool {
        *self = ProbeState::Tested(verdict);
        verdict
    }
}
