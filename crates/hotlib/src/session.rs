//! Library session
//!
//! Owns one loaded library's full lifecycle: load, symbol cache, staleness
//! detection, unload, and reload-in-place. Every operation is serialized
//! behind a single per-session mutex and runs synchronously on the
//! caller's thread; see the crate docs for the concurrency contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{PlatformLoader, SymbolAddress, SystemLoader};
use crate::error::LibraryError;
use crate::probe::run_probe;
use crate::state::{AutoReload, ProbeState, SessionStatus};

/// Default pause between unload and re-load during the reload protocol,
/// giving the platform loader time to release its address-space
/// bookkeeping. A stabilization heuristic, not a correctness guarantee;
/// tune or zero it with `set_stabilize_delay`.
pub const DEFAULT_STABILIZE_DELAY: Duration = Duration::from_millis(10);

/// One loaded library's record.
///
/// Invariants: `handle == None` iff nothing is loaded; `symbols` is empty
/// whenever `handle == None`; every cached entry was resolved against the
/// current handle generation.
struct Record<H> {
    handle: Option<H>,
    path: PathBuf,
    last_modified: SystemTime,
    symbols: HashMap<String, SymbolAddress>,
    probe: ProbeState,
}

impl<H> Default for Record<H> {
    fn default() -> Self {
        Self {
            handle: None,
            path: PathBuf::new(),
            last_modified: SystemTime::UNIX_EPOCH,
            symbols: HashMap::new(),
            probe: ProbeState::Untested,
        }
    }
}

struct SessionState<H> {
    record: Record<H>,
    auto_reload: AutoReload,
    status: SessionStatus,
    stabilize_delay: Duration,
    last_error: Option<LibraryError>,
}

impl<H> Default for SessionState<H> {
    fn default() -> Self {
        Self {
            record: Record::default(),
            auto_reload: AutoReload::Disabled,
            status: SessionStatus::Unloaded,
            stabilize_delay: DEFAULT_STABILIZE_DELAY,
            last_error: None,
        }
    }
}

/// Lifecycle owner for one dynamic library.
///
/// Construct empty with [`LibrarySession::new`], or load at construction
/// with [`LibrarySession::open`], which raises on failure. The `with_*`
/// variants inject a custom [`PlatformLoader`].
pub struct LibrarySession<L: PlatformLoader = SystemLoader> {
    loader: L,
    state: Mutex<SessionState<L::Handle>>,
}

impl LibrarySession<SystemLoader> {
    /// An empty session over the OS loader. Never loads, never fails.
    pub fn new() -> Self {
        Self::with_loader(SystemLoader)
    }

    /// Load `path` at construction.
    pub fn open(path: impl AsRef<Path>, mode: AutoReload) -> Result<Self, LibraryError> {
        Self::open_with(SystemLoader, path, mode)
    }
}

impl Default for LibrarySession<SystemLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: PlatformLoader> LibrarySession<L> {
    /// An empty session over a custom loader adapter.
    pub fn with_loader(loader: L) -> Self {
        Self {
            loader,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Load `path` at construction over a custom loader adapter.
    pub fn open_with(
        loader: L,
        path: impl AsRef<Path>,
        mode: AutoReload,
    ) -> Result<Self, LibraryError> {
        let session = Self::with_loader(loader);
        session.load(path, mode)?;
        Ok(session)
    }

    /// Load a library, replacing any current load.
    ///
    /// Validates that `path` exists and is readable, records the file's
    /// modification timestamp, then delegates to the adapter. A failed
    /// unload of the previous library is logged and does not block the new
    /// load.
    pub fn load(&self, path: impl AsRef<Path>, mode: AutoReload) -> Result<(), LibraryError> {
        let path = path.as_ref();
        let mut state = self.state.lock();

        if state.record.handle.is_some() && !self.unload_locked(&mut state) {
            warn!(
                path = %state.record.path.display(),
                "unload before replacement load failed"
            );
            // The platform refused to free the old handle; the new load
            // owns the record from here.
            state.record.handle = None;
            state.record.symbols.clear();
        }

        if std::fs::File::open(path).is_err() {
            let err = LibraryError::PathInvalid(path.to_path_buf());
            state.last_error = Some(err.clone());
            return Err(err);
        }

        state.record.path = path.to_path_buf();
        state.record.last_modified = self.loader.modification_time(path);
        state.auto_reload = mode;

        match self.loader.load(path) {
            Ok(handle) => {
                state.record.handle = Some(handle);
                state.record.probe.reset();
                state.status = SessionStatus::Loaded;
                info!(path = %path.display(), "library loaded");
                Ok(())
            }
            Err(reason) => {
                let err = LibraryError::LoadFailed {
                    path: path.to_path_buf(),
                    reason,
                };
                state.status = SessionStatus::Failed(err.to_string());
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Unload the current library.
    ///
    /// Returns `true` when nothing is loaded or the platform released the
    /// handle. On an adapter-reported failure the diagnostic is recorded
    /// and the handle is retained only if the platform left it alive.
    pub fn unload(&self) -> bool {
        let mut state = self.state.lock();
        self.unload_locked(&mut state)
    }

    /// Whether a library is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().record.handle.is_some()
    }

    /// Observable lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status.clone()
    }

    /// Path of the current (or last) library, if any was ever given.
    pub fn path(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        (!state.record.path.as_os_str().is_empty()).then(|| state.record.path.clone())
    }

    /// The most recent failure diagnostic. Single-slot: each failing
    /// operation overwrites it. Reading has no side effects.
    pub fn last_error(&self) -> Option<LibraryError> {
        self.state.lock().last_error.clone()
    }

    /// Current auto-reload policy.
    pub fn auto_reload(&self) -> AutoReload {
        self.state.lock().auto_reload
    }

    /// Update the auto-reload policy; takes effect on the next
    /// `get_symbol`/`touch` call.
    pub fn set_auto_reload(&self, mode: AutoReload) {
        self.state.lock().auto_reload = mode;
    }

    /// Tune the pause between unload and re-load in the reload protocol.
    pub fn set_stabilize_delay(&self, delay: Duration) {
        self.state.lock().stabilize_delay = delay;
    }

    /// Resolve an exported symbol, consulting the per-generation cache.
    ///
    /// With auto-reload enabled, a newer on-disk file triggers the reload
    /// protocol first; if that reload fails, no resolution is attempted
    /// and `None` is returned. A resolution miss records the diagnostic
    /// and leaves the library loaded.
    pub fn get_symbol(&self, name: &str) -> Option<SymbolAddress> {
        let mut state = self.state.lock();

        if state.record.handle.is_none() {
            state.last_error = Some(LibraryError::NotLoaded);
            return None;
        }

        if state.auto_reload == AutoReload::Enabled
            && self.needs_reload_locked(&state)
            && !self.reload_locked(&mut state)
        {
            return None;
        }

        if let Some(addr) = state.record.symbols.get(name) {
            return Some(*addr);
        }

        let resolved = {
            let handle = state.record.handle.as_ref()?;
            self.loader.resolve(handle, name)
        };
        match resolved {
            Ok(addr) => {
                state.record.symbols.insert(name.to_string(), addr);
                Some(addr)
            }
            Err(reason) => {
                let err = LibraryError::SymbolNotFound {
                    name: name.to_string(),
                    path: state.record.path.clone(),
                    reason,
                };
                debug!(%err, "symbol resolution failed");
                state.last_error = Some(err);
                None
            }
        }
    }

    /// Typed convenience over [`LibrarySession::get_symbol`].
    ///
    /// # Safety
    ///
    /// As for [`SymbolAddress::cast`]: `T` must be a pointer-sized type
    /// matching the exported symbol, and the value must not be used past
    /// the next unload or reload.
    pub unsafe fn get_symbol_as<T: Copy>(&self, name: &str) -> Option<T> {
        self.get_symbol(name).map(|addr| unsafe { addr.cast() })
    }

    /// Pure query: whether the on-disk file is strictly newer than the
    /// timestamp recorded at the last successful (re)load. Mutates nothing.
    pub fn check_for_updates(&self) -> bool {
        let state = self.state.lock();
        state.record.handle.is_some() && self.needs_reload_locked(&state)
    }

    /// Whether the library can be safely unloaded and reloaded, per the
    /// probing heuristic.
    ///
    /// The verdict is memoized per handle generation; a successful load or
    /// reload forces re-evaluation on the next query.
    pub fn can_reload(&self) -> bool {
        let mut state = self.state.lock();
        self.can_reload_locked(&mut state)
    }

    /// Run the reload protocol.
    ///
    /// Fails without side effects when nothing is loaded or the probe
    /// vetoes the reload. On a failed re-load the session ends up
    /// equivalent to never-loaded and a subsequent `load` is required to
    /// recover.
    pub fn reload(&self) -> bool {
        let mut state = self.state.lock();
        if state.record.handle.is_none() {
            state.last_error = Some(LibraryError::NotLoaded);
            return false;
        }
        self.reload_locked(&mut state)
    }

    /// Force the recorded modification timestamp to now.
    ///
    /// With auto-reload enabled this immediately runs the reload protocol,
    /// letting callers force a reload without waiting on filesystem
    /// timestamp granularity.
    pub fn touch(&self) -> bool {
        let mut state = self.state.lock();
        state.record.last_modified = SystemTime::now();
        if state.auto_reload == AutoReload::Enabled {
            return self.reload_locked(&mut state);
        }
        true
    }

    fn needs_reload_locked(&self, state: &SessionState<L::Handle>) -> bool {
        self.loader.modification_time(&state.record.path) > state.record.last_modified
    }

    fn can_reload_locked(&self, state: &mut SessionState<L::Handle>) -> bool {
        if let Some(verdict) = state.record.probe.verdict() {
            return verdict;
        }
        let verdict = run_probe(&self.loader, &state.record.path);
        state.record.probe.record(verdict)
    }

    fn unload_locked(&self, state: &mut SessionState<L::Handle>) -> bool {
        let Some(handle) = state.record.handle.take() else {
            return true;
        };

        // Cache entries are only valid against the handle generation that
        // resolved them.
        state.record.symbols.clear();
        state.status = SessionStatus::Unloading;

        match self.loader.unload(handle) {
            Ok(()) => {
                state.status = SessionStatus::Unloaded;
                debug!(path = %state.record.path.display(), "library unloaded");
                true
            }
            Err(failure) => {
                let err = LibraryError::UnloadFailed {
                    path: state.record.path.clone(),
                    reason: failure.message,
                };
                warn!(%err, "unload failed");
                // Keep faithfully tracking a handle the platform left
                // alive; consider it gone otherwise.
                state.record.handle = failure.handle;
                state.status = if state.record.handle.is_some() {
                    SessionStatus::Loaded
                } else {
                    SessionStatus::Unloaded
                };
                state.last_error = Some(err);
                false
            }
        }
    }

    fn reload_locked(&self, state: &mut SessionState<L::Handle>) -> bool {
        if !self.can_reload_locked(state) {
            let err = LibraryError::ReloadUnsupported(state.record.path.clone());
            warn!(%err, "reload refused");
            state.last_error = Some(err);
            return false;
        }

        let path = state.record.path.clone();
        state.status = SessionStatus::Reloading;

        // Best effort: a library that refuses a clean unload may still
        // accept being reopened. The refused handle is abandoned either
        // way; refusing to proceed would make stuck libraries permanently
        // unreloadable.
        if !self.unload_locked(state) {
            warn!(path = %path.display(), "unload during reload failed, reloading anyway");
            state.record.handle = None;
            state.record.symbols.clear();
        }
        state.status = SessionStatus::Reloading;

        if !state.stabilize_delay.is_zero() {
            std::thread::sleep(state.stabilize_delay);
        }

        // Refresh the stamp so auto-reload does not immediately re-trigger
        // on the very next symbol access.
        state.record.last_modified = self.loader.modification_time(&path);

        match self.loader.load(&path) {
            Ok(handle) => {
                state.record.handle = Some(handle);
                state.record.probe.reset();
                state.status = SessionStatus::Loaded;
                info!(path = %path.display(), "library reloaded");
                true
            }
            Err(reason) => {
                let err = LibraryError::ReloadFailed {
                    path: path.clone(),
                    reason,
                };
                warn!(%err, "reload failed");
                state.status = SessionStatus::Failed(err.to_string());
                state.last_error = Some(err);
                false
            }
        }
    }
}

impl<L: PlatformLoader> std::fmt::Debug for LibrarySession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LibrarySession")
            .field("path", &state.record.path)
            .field("status", &state.status)
            .field("auto_reload", &state.auto_reload)
            .finish_non_exhaustive()
    }
}

impl<L: PlatformLoader> Drop for LibrarySession<L> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(handle) = state.record.handle.take() {
            if let Err(failure) = self.loader.unload(handle) {
                debug!(
                    path = %state.record.path.display(),
                    reason = %failure.message,
                    "unload on drop failed"
                );
            }
        }
    }
}
