//! Dynamic library and filesystem primitives, one implementation per target family.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use tracing::debug;

use crate::error::{LoadError, UnloadError};

/// Path and file naming rules of a target operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathConventions {
    /// Directory separator.
    pub separator: &'static str,
    /// Delimiter between entries of a search path.
    pub delimiter: &'static str,
    /// File name of the CoreCLR shared library.
    pub engine_library: &'static str,
}

impl PathConventions {
    pub const WINDOWS: PathConventions = PathConventions {
        separator: "\\",
        delimiter: ";",
        engine_library: "coreclr.dll",
    };

    pub const MACOS: PathConventions = PathConventions {
        separator: "/",
        delimiter: ":",
        engine_library: "libcoreclr.dylib",
    };

    pub const POSIX: PathConventions = PathConventions {
        separator: "/",
        delimiter: ":",
        engine_library: "libcoreclr.so",
    };

    /// Conventions of the platform this host was built for.
    pub const fn native() -> PathConventions {
        if cfg!(windows) {
            PathConventions::WINDOWS
        } else if cfg!(target_os = "macos") {
            PathConventions::MACOS
        } else {
            PathConventions::POSIX
        }
    }
}

/// Everything the host needs from the operating system.
///
/// Symbols are handed out as raw addresses; the caller decides which signature they carry.
pub trait Platform {
    type Library;

    fn conventions(&self) -> PathConventions;

    fn load_library(&self, path: &Path) -> Result<Self::Library, LoadError>;

    /// Returns `None` when the symbol is not exported or resolves to null.
    fn resolve_symbol(&self, library: &Self::Library, name: &str) -> Option<NonNull<c_void>>;

    fn unload_library(&self, library: Self::Library) -> Result<(), UnloadError>;

    /// Release a string allocated by managed code.
    ///
    /// # Safety
    /// `ptr` must have been allocated by the runtime's native allocator and not freed yet.
    unsafe fn free_managed(&self, ptr: NonNull<c_char>);

    /// Names of the entries of `dir`, in whatever order the OS returns them.
    ///
    /// Fails only when `dir` cannot be opened; entries that fail to read are skipped.
    fn read_dir_names(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let entries = fs::read_dir(dir)?.map(|entry| entry.map(|e| e.file_name()));
        Ok(readable_names(dir, entries))
    }
}

fn readable_names(dir: &Path, entries: impl Iterator<Item = io::Result<OsString>>) -> Vec<OsString> {
    entries
        .filter_map(|entry| match entry {
            Ok(name) => Some(name),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .collect()
}

/// Absolute path of the running executable, with symlinks resolved on POSIX systems.
pub fn current_exe_path() -> io::Result<PathBuf> {
    let exe = env::current_exe()?;
    if cfg!(windows) {
        // canonicalize would produce a verbatim `\\?\` path, which CoreCLR does not expect.
        Ok(exe)
    } else {
        fs::canonicalize(exe)
    }
}

/// The platform the host is running on.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl Platform for NativePlatform {
    type Library = Library;

    fn conventions(&self) -> PathConventions {
        PathConventions::native()
    }

    fn load_library(&self, path: &Path) -> Result<Library, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound);
        }
        // Loading runs the library's initializers; CoreCLR's are trusted here.
        unsafe { Library::new(path) }.map_err(|e| LoadError::Unmappable(e.to_string()))
    }

    fn resolve_symbol(&self, library: &Library, name: &str) -> Option<NonNull<c_void>> {
        let symbol = unsafe { library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }

    fn unload_library(&self, library: Library) -> Result<(), UnloadError> {
        library.close().map_err(|e| UnloadError(e.to_string()))
    }

    unsafe fn free_managed(&self, ptr: NonNull<c_char>) {
        release(ptr.as_ptr().cast());
    }
}

#[cfg(unix)]
unsafe fn release(ptr: *mut c_void) {
    libc::free(ptr);
}

#[cfg(windows)]
unsafe fn release(ptr: *mut c_void) {
    windows::Win32::System::Com::CoTaskMemFree(Some(ptr as *const c_void));
}

/// Copy `text` into a buffer owned by the allocator managed code uses for returned strings.
#[cfg(test)]
pub(crate) fn alloc_managed_string(text: &str) -> *mut c_char {
    let len = text.len();
    #[cfg(unix)]
    let buffer = unsafe { libc::malloc(len + 1) }.cast::<c_char>();
    #[cfg(windows)]
    let buffer = unsafe { windows::Win32::System::Com::CoTaskMemAlloc(len + 1) }.cast::<c_char>();
    assert!(!buffer.is_null());
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), buffer, len);
        *buffer.add(len) = 0;
    }
    buffer
}
