//! Counting mock over the platform loader contract.
//!
//! Every adapter call is tallied so tests can observe probe frequency,
//! cache hits, and leaked handles through a side channel, and failures can
//! be injected per operation.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use hotlib::{AutoReload, LibrarySession, PlatformLoader, SymbolAddress, UnloadFailure};

/// Move-only stand-in for an OS handle, tagged with its load generation.
#[derive(Debug, PartialEq, Eq)]
pub struct MockHandle(pub u64);

struct MockState {
    loads: usize,
    unloads: usize,
    resolves: usize,
    mtime_queries: usize,
    next_generation: u64,
    live: HashSet<u64>,
    resident: bool,
    fail_load: bool,
    fail_unload: bool,
    keep_handle_on_unload_failure: bool,
    missing_symbols: HashSet<String>,
    mtime: SystemTime,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            loads: 0,
            unloads: 0,
            resolves: 0,
            mtime_queries: 0,
            next_generation: 0,
            live: HashSet::new(),
            resident: false,
            fail_load: false,
            fail_unload: false,
            keep_handle_on_unload_failure: false,
            missing_symbols: HashSet::new(),
            // Fixed base time so a fresh load never looks stale.
            mtime: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockLoader {
    state: Arc<Mutex<MockState>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.state.lock().unwrap().loads
    }

    pub fn unloads(&self) -> usize {
        self.state.lock().unwrap().unloads
    }

    pub fn resolves(&self) -> usize {
        self.state.lock().unwrap().resolves
    }

    pub fn mtime_queries(&self) -> usize {
        self.state.lock().unwrap().mtime_queries
    }

    /// Handles loaded (or probed) and never successfully unloaded.
    pub fn live_handles(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn set_resident(&self, resident: bool) {
        self.state.lock().unwrap().resident = resident;
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.state.lock().unwrap().fail_load = fail;
    }

    pub fn set_fail_unload(&self, fail: bool) {
        self.state.lock().unwrap().fail_unload = fail;
    }

    pub fn set_keep_handle_on_unload_failure(&self, keep: bool) {
        self.state.lock().unwrap().keep_handle_on_unload_failure = keep;
    }

    pub fn hide_symbol(&self, name: &str) {
        self.state.lock().unwrap().missing_symbols.insert(name.to_string());
    }

    pub fn advance_mtime(&self, by: Duration) {
        let mut state = self.state.lock().unwrap();
        state.mtime += by;
    }
}

impl PlatformLoader for MockLoader {
    type Handle = MockHandle;

    fn load(&self, _path: &Path) -> Result<MockHandle, String> {
        let mut state = self.state.lock().unwrap();
        state.loads += 1;
        if state.fail_load {
            return Err("mock load failure".into());
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.live.insert(generation);
        Ok(MockHandle(generation))
    }

    fn resolve(&self, handle: &MockHandle, name: &str) -> Result<SymbolAddress, String> {
        let mut state = self.state.lock().unwrap();
        state.resolves += 1;
        if state.missing_symbols.contains(name) {
            return Err(format!("undefined symbol: {name}"));
        }
        // Deterministic address that depends on the handle generation, so
        // a reload observably moves every symbol.
        let mut hash = 0usize;
        for byte in name.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
        }
        let addr = ((handle.0 as usize) << 20) | (hash & 0xf_ffff);
        Ok(SymbolAddress::new(addr as *mut std::ffi::c_void))
    }

    fn unload(&self, handle: MockHandle) -> Result<(), UnloadFailure<MockHandle>> {
        let mut state = self.state.lock().unwrap();
        state.unloads += 1;
        if state.fail_unload {
            let survivor = state.keep_handle_on_unload_failure.then_some(handle);
            return Err(UnloadFailure {
                handle: survivor,
                message: "mock unload failure".into(),
            });
        }
        state.live.remove(&handle.0);
        Ok(())
    }

    fn modification_time(&self, _path: &Path) -> SystemTime {
        let mut state = self.state.lock().unwrap();
        state.mtime_queries += 1;
        state.mtime
    }

    fn open_resident(&self, _path: &Path) -> Option<MockHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.resident {
            return None;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.live.insert(generation);
        Some(MockHandle(generation))
    }
}

/// A real on-disk file standing in for a loadable artifact; session path
/// validation opens it.
pub fn artifact() -> tempfile::NamedTempFile {
    tempfile::NamedTempFile::new().unwrap()
}

/// A session loaded from a fresh artifact over a fresh mock, with the
/// reload stabilization delay zeroed to keep tests fast.
pub fn open_session(
    mode: AutoReload,
) -> (MockLoader, tempfile::NamedTempFile, LibrarySession<MockLoader>) {
    let loader = MockLoader::new();
    let file = artifact();
    let session = LibrarySession::open_with(loader.clone(), file.path(), mode).unwrap();
    session.set_stabilize_delay(Duration::ZERO);
    (loader, file, session)
}
