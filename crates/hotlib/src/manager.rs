//! Library registry
//!
//! Named collection of sessions with idempotent-by-name registration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::adapter::{PlatformLoader, SystemLoader};
use crate::error::LibraryError;
use crate::session::LibrarySession;
use crate::state::AutoReload;

/// Owns a named collection of [`LibrarySession`]s.
///
/// The registry is the source of truth for registration: `load_library`
/// hands out shared references, and `unload_library` removes the entry —
/// the session itself is destroyed (releasing its handle) once the last
/// outstanding reference drops.
///
/// Registry-mutating operations are serialized behind the registry's own
/// lock, independent of the per-session locks: a slow reload inside one
/// session never blocks lookups of other sessions. `check_all_for_updates`
/// holds the registry lock for its whole scan.
pub struct LibraryManager<L: PlatformLoader = SystemLoader> {
    loader: L,
    sessions: Mutex<HashMap<String, Arc<LibrarySession<L>>>>,
}

impl LibraryManager<SystemLoader> {
    /// A registry over the OS loader.
    pub fn new() -> Self {
        Self::with_loader(SystemLoader)
    }
}

impl Default for LibraryManager<SystemLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: PlatformLoader> LibraryManager<L> {
    /// A registry over a custom loader adapter, cloned into each session.
    pub fn with_loader(loader: L) -> Self {
        Self {
            loader,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a registered session. Never constructs.
    pub fn get_library(&self, name: &str) -> Option<Arc<LibrarySession<L>>> {
        self.sessions.lock().get(name).cloned()
    }

    /// Remove a session from the registry. Absent names are a no-op.
    pub fn unload_library(&self, name: &str) {
        if self.sessions.lock().remove(name).is_some() {
            info!(name, "library unregistered");
        }
    }

    /// `true` as soon as any registered session reports a pending update.
    /// Short-circuits; does not report which session.
    pub fn check_all_for_updates(&self) -> bool {
        self.sessions
            .lock()
            .values()
            .any(|session| session.check_for_updates())
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.lock().contains_key(name)
    }

    /// Names of all registered sessions.
    pub fn names(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl<L: PlatformLoader + Clone> LibraryManager<L> {
    /// Register and load a library under `name`, or return the already
    /// registered session.
    ///
    /// First registration for a name wins: a second call with the same
    /// name and a *different* path still returns the original session
    /// unchanged, with no reload and no validation against the new path.
    /// Construction failures (`PathInvalid`, `LoadFailed`) are raised and
    /// nothing is registered.
    pub fn load_library(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        mode: AutoReload,
    ) -> Result<Arc<LibrarySession<L>>, LibraryError> {
        let mut sessions = self.sessions.lock();

        if let Some(existing) = sessions.get(name) {
            debug!(name, "returning already-registered session");
            return Ok(existing.clone());
        }

        let session = Arc::new(LibrarySession::open_with(self.loader.clone(), path, mode)?);
        sessions.insert(name.to_string(), session.clone());
        info!(name, "library registered");
        Ok(session)
    }
}
