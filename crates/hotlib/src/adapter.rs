//! Platform loader adapter
//!
//! Thin contract over the operating system's dynamic loader primitives,
//! plus the real-OS implementation built on `libloading`.

use std::ffi::c_void;
use std::path::Path;
use std::time::SystemTime;

/// A resolved symbol address.
///
/// Addresses are plain values: they stay valid only until the owning
/// session unloads or reloads the library, and are not guaranteed stable
/// across a reload. Callers must re-resolve after every reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddress(*mut c_void);

impl SymbolAddress {
    /// Wrap a raw address.
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// The raw address.
    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    /// Reinterpret the address as `T`, usually an `extern "C" fn` type.
    ///
    /// # Safety
    ///
    /// `T` must be a pointer-sized type matching the exported symbol's
    /// actual type, and the address must still belong to a live handle
    /// generation.
    pub unsafe fn cast<T: Copy>(&self) -> T {
        assert_eq!(
            std::mem::size_of::<T>(),
            std::mem::size_of::<*mut c_void>()
        );
        unsafe { std::mem::transmute_copy(&self.0) }
    }
}

// An address value, not a dereference. Using it is the caller's unsafe
// contract, holding it is not.
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

/// Report for an unload the platform rejected.
///
/// `handle` is `Some` when the platform left the handle usable despite the
/// failure; the session keeps tracking it in that case. `None` means the
/// handle was consumed and nothing is left to own.
#[derive(Debug)]
pub struct UnloadFailure<H> {
    pub handle: Option<H>,
    pub message: String,
}

/// Contract over the OS loader primitives.
///
/// Error payloads are the platform's diagnostic text; sessions wrap them
/// into [`crate::LibraryError`] variants. Implementations other than
/// [`SystemLoader`] exist for testing.
pub trait PlatformLoader {
    /// Opaque token identifying one loaded library. Move-only: exactly one
    /// record owns a live handle, and it is invalidated the instant an
    /// unload succeeds.
    type Handle: Send;

    /// Load the library at `path`.
    fn load(&self, path: &Path) -> Result<Self::Handle, String>;

    /// Resolve an exported symbol.
    ///
    /// Implementations must clear any prior loader error state before
    /// resolving, so a stale diagnostic is never misattributed to this
    /// lookup.
    fn resolve(&self, handle: &Self::Handle, name: &str) -> Result<SymbolAddress, String>;

    /// Unload a previously loaded library, consuming the handle.
    fn unload(&self, handle: Self::Handle) -> Result<(), UnloadFailure<Self::Handle>>;

    /// Last write time of `path`, falling back to the current time when
    /// the filesystem query fails.
    fn modification_time(&self, path: &Path) -> SystemTime;

    /// Best-effort: a handle to an instance of `path` already resident in
    /// the process, obtained without loading. Used only by the
    /// reload-safety probe. Platforms without the capability return `None`
    /// and the probe falls through to its load/unload branch.
    fn open_resident(&self, path: &Path) -> Option<Self::Handle>;
}

#[cfg(unix)]
fn sys_load(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LOCAL, RTLD_NOW};
    // SAFETY: loading runs the library's initializers; that is the point.
    unsafe { Library::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Into::into)
}

#[cfg(windows)]
fn sys_load(path: &Path) -> Result<libloading::Library, libloading::Error> {
    // SAFETY: loading runs the library's initializers; that is the point.
    unsafe { libloading::Library::new(path) }
}

#[cfg(unix)]
fn sys_open_resident(path: &Path) -> Option<libloading::Library> {
    use libloading::os::unix::{Library, RTLD_NOW};
    // RTLD_NOLOAD: NULL unless the library is already resident.
    unsafe { Library::open(Some(path), RTLD_NOW | libc::RTLD_NOLOAD) }
        .ok()
        .map(Into::into)
}

#[cfg(windows)]
fn sys_open_resident(path: &Path) -> Option<libloading::Library> {
    unsafe { libloading::os::windows::Library::open_already_loaded(path) }
        .ok()
        .map(Into::into)
}

/// [`PlatformLoader`] over the real operating-system loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLoader;

impl PlatformLoader for SystemLoader {
    type Handle = libloading::Library;

    fn load(&self, path: &Path) -> Result<Self::Handle, String> {
        sys_load(path).map_err(|e| e.to_string())
    }

    fn resolve(&self, handle: &Self::Handle, name: &str) -> Result<SymbolAddress, String> {
        // libloading clears and re-checks dlerror around dlsym, so a NULL
        // export is distinguished from a genuine miss.
        let sym = unsafe { handle.get::<*mut c_void>(name.as_bytes()) }
            .map_err(|e| e.to_string())?;
        Ok(SymbolAddress::new(*sym))
    }

    fn unload(&self, handle: Self::Handle) -> Result<(), UnloadFailure<Self::Handle>> {
        // dlclose/FreeLibrary consume the handle whether or not they
        // report success; there is nothing left to hand back on failure.
        handle.close().map_err(|e| UnloadFailure {
            handle: None,
            message: e.to_string(),
        })
    }

    fn modification_time(&self, path: &Path) -> SystemTime {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now())
    }

    fn open_resident(&self, path: &Path) -> Option<Self::Handle> {
        sys_open_resident(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn modification_time_falls_back_to_now() {
        let stamp = SystemLoader.modification_time(Path::new("/no/such/file.so"));
        let age = SystemTime::now()
            .duration_since(stamp)
            .unwrap_or(Duration::ZERO);
        assert!(age < Duration::from_secs(5));
    }

    #[test]
    fn modification_time_of_real_file_is_past() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let stamp = SystemLoader.modification_time(file.path());
        assert!(stamp <= SystemTime::now());
    }

    #[test]
    fn symbol_address_cast_roundtrip() {
        let addr = SymbolAddress::new(0x1f40 as *mut c_void);
        let raw: usize = unsafe { addr.cast() };
        assert_eq!(raw, 0x1f40);
    }

    #[test]
    fn open_resident_of_unloaded_path_is_none() {
        assert!(SystemLoader.open_resident(Path::new("/no/such/file.so")).is_none());
    }
}
