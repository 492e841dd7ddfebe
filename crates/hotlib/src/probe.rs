//! Reload-safety prober
//!
//! Best-effort heuristic answering whether a library, once loaded, can be
//! unloaded and later reloaded without leaving dangling process state
//! (static state, unreleased thread-locals, a reference count the platform
//! refuses to drop). It observes whether a real unload succeeds rather
//! than attempting any static analysis.

use std::path::Path;

use tracing::debug;

use crate::adapter::PlatformLoader;

/// Probe whether `path` tolerates an unload/reload cycle.
///
/// If an instance of the library is already resident in the process, the
/// probe attempts a bare unload of that residency and reports its outcome.
/// Otherwise it performs a throwaway load with no symbol resolution
/// followed by an immediate unload, and reports whether the unload
/// succeeded. Any failure to even attempt the cycle reports `false`.
///
/// Advisory only: the probe never raises, and from the caller's point of
/// view it leaves the library in the loaded/unloaded state it found it in.
/// The throwaway instance is always released before returning.
pub fn run_probe<L: PlatformLoader>(loader: &L, path: &Path) -> bool {
    // An instance already resident in the process: test whether that
    // residency can be dropped.
    if let Some(resident) = loader.open_resident(path) {
        let verdict = loader.unload(resident).is_ok();
        debug!(path = %path.display(), verdict, "probed resident instance");
        return verdict;
    }

    // Not resident: throwaway load, then immediately unload it.
    let verdict = match loader.load(path) {
        Ok(handle) => loader.unload(handle).is_ok(),
        Err(reason) => {
            debug!(path = %path.display(), %reason, "probe load failed");
            return false;
        }
    };
    debug!(path = %path.display(), verdict, "probed throwaway instance");
    verdict
}
