//! Trusted platform assembly (TPA) list construction.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::platform::Platform;

/// Assembly paths to hand to CoreCLR, each followed by the search path delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyList {
    paths: Vec<OsString>,
    delimiter: &'static str,
}

impl AssemblyList {
    pub fn empty(delimiter: &'static str) -> Self {
        AssemblyList {
            paths: Vec::new(),
            delimiter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Individual paths in list order.
    pub fn entries(&self) -> impl Iterator<Item = &OsStr> {
        self.paths.iter().map(OsString::as_os_str)
    }

    /// The `TRUSTED_PLATFORM_ASSEMBLIES` value: every path, delimiter-terminated.
    pub fn joined(&self) -> OsString {
        let mut joined = OsString::new();
        for path in &self.paths {
            joined.push(path);
            joined.push(self.delimiter);
        }
        joined
    }
}

impl fmt::Display for AssemblyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined().to_string_lossy())
    }
}

/// Add every entry of `directory` whose name ends in `extension` to a TPA list.
///
/// This includes native libraries (CoreCLR itself when it sits next to the host) that don't
/// belong on the list; the runtime tolerates them. Entries are neither deduplicated nor
/// checked for being regular files, and subdirectories are not searched. Names are compared
/// byte for byte, so entries that are not valid UTF-8 are kept as well.
pub fn build_tpa_list<P: Platform + ?Sized>(
    platform: &P,
    directory: &str,
    extension: &str,
) -> io::Result<AssemblyList> {
    let conventions = platform.conventions();
    let mut list = AssemblyList::empty(conventions.delimiter);

    for name in platform.read_dir_names(Path::new(directory))? {
        let bytes = name.as_encoded_bytes();
        if bytes.len() <= extension.len() || !bytes.ends_with(extension.as_bytes()) {
            continue;
        }
        let mut path = OsString::from(directory);
        path.push(conventions.separator);
        path.push(&name);
        list.paths.push(path);
    }

    debug!(directory, extension, count = list.len(), "built trusted assembly list");
    Ok(list)
}
