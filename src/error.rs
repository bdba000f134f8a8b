use std::ffi::NulError;
use std::fmt;
use std::io;
use std::os::raw::c_int;
use std::path::PathBuf;

/// Status code returned by the CoreCLR hosting entry points. Negative values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub c_int);

impl Status {
    pub fn succeeded(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// Why the engine library could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("library not found")]
    NotFound,
    #[error("library could not be mapped: {0}")]
    Unmappable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct UnloadError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to load CoreCLR from {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("{0} not found")]
    MissingEntryPoint(&'static str),

    #[error("unable to locate the host executable: {0}")]
    ExecutablePath(#[source] io::Error),

    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("string passed to CoreCLR contains a nul byte: {0}")]
    InteriorNul(#[from] NulError),

    #[error("{0} does not fit in a 32-bit count")]
    Overflow(&'static str),

    #[error("coreclr_initialize failed - status: {0}")]
    Initialize(Status),

    #[error("coreclr_create_delegate failed - status: {0}")]
    CreateDelegate(Status),

    #[error("managed code returned a null string")]
    NullResult,

    #[error("coreclr_shutdown failed - status: {0}")]
    Shutdown(Status),

    #[error("failed to free libcoreclr: {0}")]
    Unload(#[source] UnloadError),
}

pub type Result<T> = std::result::Result<T, HostError>;
