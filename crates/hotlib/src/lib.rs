//! Runtime loading, symbol resolution and safe reload-in-place of dynamic
//! libraries.
//!
//! A [`LibrarySession`] owns one loaded library: it validates and loads the
//! file, caches resolved symbols per handle generation, detects on-disk
//! modification, and runs a probed unload/reload protocol when the file
//! changes. Before any unload, the session consults the reload-safety
//! prober ([`run_probe`]), a best-effort heuristic that performs a real
//! load/unload cycle to observe whether the platform can actually drop the
//! library. A [`LibraryManager`] owns a named collection of sessions with
//! idempotent-by-name registration.
//!
//! The OS loader is reached through the [`PlatformLoader`] contract, with
//! [`SystemLoader`] as the `libloading`-backed implementation; tests and
//! embedders can substitute their own.
//!
//! # Concurrency
//!
//! There are no internal threads. Every session operation is a blocking,
//! synchronous call serialized behind that session's lock; the registry
//! has its own lock, so work inside one session never blocks lookups of
//! another. If a platform loader call hangs, the session lock is held for
//! the duration.
//!
//! Raw [`SymbolAddress`]es handed to callers are valid only until the next
//! unload or reload of their session: re-resolve after every reload.
//!
//! ```no_run
//! use hotlib::{AutoReload, LibrarySession};
//!
//! let session = LibrarySession::open("plugins/libgame.so", AutoReload::Enabled)?;
//! if let Some(tick) = session.get_symbol("game_tick") {
//!     let tick: extern "C" fn() = unsafe { tick.cast() };
//!     tick();
//! }
//! # Ok::<(), hotlib::LibraryError>(())
//! ```

mod adapter;
mod error;
mod manager;
mod probe;
mod session;
mod state;

pub use adapter::{PlatformLoader, SymbolAddress, SystemLoader, UnloadFailure};
pub use error::LibraryError;
pub use manager::LibraryManager;
pub use probe::run_probe;
pub use session::{DEFAULT_STABILIZE_DELAY, LibrarySession};
pub use state::{AutoReload, ProbeState, SessionStatus};
