//! The CoreCLR hosting API: `coreclr_initialize`, `coreclr_create_delegate`, `coreclr_shutdown`.

use std::ffi::{CStr, CString, OsStr};
use std::fmt;
use std::mem;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr::{self, NonNull};

use tracing::warn;

use crate::bridge::ManagedDelegate;
use crate::error::{HostError, Result, Status};
use crate::platform::Platform;

pub type CoreClrInitializeFn = unsafe extern "C" fn(
    exe_path: *const c_char,
    app_domain_friendly_name: *const c_char,
    property_count: c_int,
    property_keys: *const *const c_char,
    property_values: *const *const c_char,
    host_handle: *mut *mut c_void,
    domain_id: *mut c_uint,
) -> c_int;

pub type CoreClrCreateDelegateFn = unsafe extern "C" fn(
    host_handle: *mut c_void,
    domain_id: c_uint,
    entry_point_assembly_name: *const c_char,
    entry_point_type_name: *const c_char,
    entry_point_method_name: *const c_char,
    delegate: *mut *mut c_void,
) -> c_int;

pub type CoreClrShutdownFn = unsafe extern "C" fn(host_handle: *mut c_void, domain_id: c_uint) -> c_int;

pub const INITIALIZE: &str = "coreclr_initialize";
pub const CREATE_DELEGATE: &str = "coreclr_create_delegate";
pub const SHUTDOWN: &str = "coreclr_shutdown";

/// The three hosting functions, resolved once from the loaded library.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    initialize: CoreClrInitializeFn,
    create_delegate: CoreClrCreateDelegateFn,
    shutdown: CoreClrShutdownFn,
}

impl EntryPoints {
    /// Fails on the first entry point the library does not export.
    ///
    /// # Safety
    /// The symbols must carry the CoreCLR hosting signatures and `library` must stay loaded
    /// for as long as the returned value is used.
    pub unsafe fn resolve<P: Platform + ?Sized>(platform: &P, library: &P::Library) -> Result<Self> {
        let symbol = |name: &'static str| {
            platform
                .resolve_symbol(library, name)
                .ok_or(HostError::MissingEntryPoint(name))
        };

        let initialize = symbol(INITIALIZE)?;
        let create_delegate = symbol(CREATE_DELEGATE)?;
        let shutdown = symbol(SHUTDOWN)?;

        Ok(EntryPoints {
            initialize: mem::transmute::<*mut c_void, CoreClrInitializeFn>(initialize.as_ptr()),
            create_delegate: mem::transmute::<*mut c_void, CoreClrCreateDelegateFn>(create_delegate.as_ptr()),
            shutdown: mem::transmute::<*mut c_void, CoreClrShutdownFn>(shutdown.as_ptr()),
        })
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("initialize", &(self.initialize as *const c_void))
            .field("create_delegate", &(self.create_delegate as *const c_void))
            .field("shutdown", &(self.shutdown as *const c_void))
            .finish()
    }
}

/// Runtime properties, passed to `coreclr_initialize` as parallel arrays in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyList {
    keys: Vec<CString>,
    values: Vec<CString>,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: &str) -> Result<()> {
        let key = CString::new(key)?;
        let value = CString::new(value)?;
        self.keys.push(key);
        self.values.push(value);
        Ok(())
    }

    /// Like [`PropertyList::push`], for values that come straight from the filesystem.
    pub fn push_os(&mut self, key: &str, value: &OsStr) -> Result<()> {
        let key = CString::new(key)?;
        let value = CString::new(value.as_encoded_bytes())?;
        self.keys.push(key);
        self.values.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CStr, &CStr)> {
        self.keys
            .iter()
            .map(CString::as_c_str)
            .zip(self.values.iter().map(CString::as_c_str))
    }

    fn key_ptrs(&self) -> Vec<*const c_char> {
        self.keys.iter().map(|k| k.as_ptr()).collect()
    }

    fn value_ptrs(&self) -> Vec<*const c_char> {
        self.values.iter().map(|v| v.as_ptr()).collect()
    }
}

/// A started runtime and its default AppDomain.
///
/// Shut down exactly once: explicitly through [`Engine::shutdown`], or on drop otherwise.
#[derive(Debug)]
pub struct Engine<'lib> {
    entry_points: &'lib EntryPoints,
    host_handle: *mut c_void,
    domain_id: c_uint,
    shut_down: bool,
}

impl<'lib> Engine<'lib> {
    /// Start the runtime and create its default AppDomain.
    pub fn initialize(
        entry_points: &'lib EntryPoints,
        exe_path: &str,
        app_domain_friendly_name: &str,
        properties: &PropertyList,
    ) -> Result<Self> {
        let exe_path = CString::new(exe_path)?;
        let app_domain_friendly_name = CString::new(app_domain_friendly_name)?;
        let property_count =
            c_int::try_from(properties.len()).map_err(|_| HostError::Overflow("property count"))?;
        let keys = properties.key_ptrs();
        let values = properties.value_ptrs();

        let mut host_handle = ptr::null_mut();
        let mut domain_id = 0;
        let status = Status(unsafe {
            (entry_points.initialize)(
                exe_path.as_ptr(),
                app_domain_friendly_name.as_ptr(),
                property_count,
                keys.as_ptr(),
                values.as_ptr(),
                &mut host_handle,
                &mut domain_id,
            )
        });

        if !status.succeeded() {
            return Err(HostError::Initialize(status));
        }

        Ok(Engine {
            entry_points,
            host_handle,
            domain_id,
            shut_down: false,
        })
    }

    pub fn domain_id(&self) -> c_uint {
        self.domain_id
    }

    /// Bind to a static managed method. `assembly_name` is a full assembly name, e.g.
    /// `ManagedLibrary, Version=1.0.0.0`.
    pub fn create_delegate(
        &self,
        assembly_name: &str,
        type_name: &str,
        method_name: &str,
    ) -> Result<ManagedDelegate<'_>> {
        let assembly_name = CString::new(assembly_name)?;
        let type_name = CString::new(type_name)?;
        let method_name = CString::new(method_name)?;

        let mut delegate = ptr::null_mut();
        let status = Status(unsafe {
            (self.entry_points.create_delegate)(
                self.host_handle,
                self.domain_id,
                assembly_name.as_ptr(),
                type_name.as_ptr(),
                method_name.as_ptr(),
                &mut delegate,
            )
        });

        if !status.succeeded() {
            return Err(HostError::CreateDelegate(status));
        }
        let delegate = NonNull::new(delegate).ok_or(HostError::CreateDelegate(status))?;
        Ok(unsafe { ManagedDelegate::from_raw(delegate) })
    }

    /// Unload the AppDomain and stop the runtime.
    pub fn shutdown(mut self) -> Result<Status> {
        self.shutdown_once()
    }

    fn shutdown_once(&mut self) -> Result<Status> {
        self.shut_down = true;
        let status = Status(unsafe { (self.entry_points.shutdown)(self.host_handle, self.domain_id) });
        if status.succeeded() {
            Ok(status)
        } else {
            Err(HostError::Shutdown(status))
        }
    }
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.shutdown_once() {
            warn!("{}", e);
        }
    }
}
