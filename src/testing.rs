//! In-process stand-ins for the OS loader and for libcoreclr.
//!
//! The fake engine is a set of real `extern "C"` functions; what they receive is recorded in
//! thread-local state, so every test observes only its own calls.

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, OsString};
use std::io;
use std::os::raw::{c_char, c_double, c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::bridge::{DoWorkFn, ReportProgressFn};
use crate::coreclr::{
    CoreClrCreateDelegateFn, CoreClrInitializeFn, CoreClrShutdownFn, CREATE_DELEGATE, INITIALIZE, SHUTDOWN,
};
use crate::error::{LoadError, UnloadError};
use crate::platform::{self, PathConventions, Platform};

pub const FAKE_HOST_HANDLE: usize = 0xc1a0;
pub const FAKE_DOMAIN_ID: c_uint = 1;

#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub init_status: c_int,
    pub delegate_status: c_int,
    pub shutdown_status: c_int,
    pub null_delegate: bool,
    pub null_result: bool,

    pub init_calls: usize,
    pub delegate_calls: usize,
    pub shutdown_calls: usize,
    pub work_calls: usize,

    pub exe_path: String,
    pub domain_name: String,
    pub properties: Vec<(String, String)>,
    pub delegate_target: Option<(String, String, String)>,
    pub delegate_handles: Vec<(usize, c_uint)>,
    pub shutdown_handles: Vec<(usize, c_uint)>,
    pub job: Option<(String, c_int, Vec<f64>)>,
    pub progress_acks: Vec<(c_int, c_int)>,
}

thread_local! {
    static ENGINE: RefCell<EngineState> = RefCell::new(EngineState::default());
}

pub fn reset_engine() {
    ENGINE.with(|e| *e.borrow_mut() = EngineState::default());
}

pub fn configure_engine(f: impl FnOnce(&mut EngineState)) {
    ENGINE.with(|e| f(&mut e.borrow_mut()));
}

pub fn engine_state() -> EngineState {
    ENGINE.with(|e| e.borrow().clone())
}

unsafe fn string(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe extern "C" fn fake_initialize(
    exe_path: *const c_char,
    app_domain_friendly_name: *const c_char,
    property_count: c_int,
    property_keys: *const *const c_char,
    property_values: *const *const c_char,
    host_handle: *mut *mut c_void,
    domain_id: *mut c_uint,
) -> c_int {
    let mut properties = Vec::new();
    for i in 0..property_count as usize {
        properties.push((string(*property_keys.add(i)), string(*property_values.add(i))));
    }
    let exe_path = string(exe_path);
    let domain_name = string(app_domain_friendly_name);

    ENGINE.with(|e| {
        let mut e = e.borrow_mut();
        e.init_calls += 1;
        e.exe_path = exe_path;
        e.domain_name = domain_name;
        e.properties = properties;
        if e.init_status >= 0 {
            *host_handle = FAKE_HOST_HANDLE as *mut c_void;
            *domain_id = FAKE_DOMAIN_ID;
        }
        e.init_status
    })
}

unsafe extern "C" fn fake_create_delegate(
    host_handle: *mut c_void,
    domain_id: c_uint,
    assembly_name: *const c_char,
    type_name: *const c_char,
    method_name: *const c_char,
    delegate: *mut *mut c_void,
) -> c_int {
    let target = (string(assembly_name), string(type_name), string(method_name));
    ENGINE.with(|e| {
        let mut e = e.borrow_mut();
        e.delegate_calls += 1;
        e.delegate_handles.push((host_handle as usize, domain_id));
        e.delegate_target = Some(target);
        if e.delegate_status >= 0 && !e.null_delegate {
            *delegate = fake_do_work as DoWorkFn as *mut c_void;
        }
        e.delegate_status
    })
}

unsafe extern "C" fn fake_shutdown(host_handle: *mut c_void, domain_id: c_uint) -> c_int {
    ENGINE.with(|e| {
        let mut e = e.borrow_mut();
        e.shutdown_calls += 1;
        e.shutdown_handles.push((host_handle as usize, domain_id));
        e.shutdown_status
    })
}

unsafe extern "C" fn fake_do_work(
    job_name: *const c_char,
    iterations: c_int,
    data_size: c_int,
    data: *mut c_double,
    callback: ReportProgressFn,
) -> *mut c_char {
    let name = string(job_name);
    let values = std::slice::from_raw_parts(data, data_size as usize).to_vec();
    let sum: f64 = values.iter().sum();

    let mut acks = Vec::new();
    for progress in 1..=iterations {
        acks.push((progress, callback(progress)));
    }

    let null_result = ENGINE.with(|e| {
        let mut e = e.borrow_mut();
        e.work_calls += 1;
        e.job = Some((name.clone(), iterations, values));
        e.progress_acks = acks;
        e.null_result
    });
    if null_result {
        return std::ptr::null_mut();
    }
    platform::alloc_managed_string(&format!("{name} done after {iterations} iterations, sum {sum}"))
}

#[derive(Debug)]
pub struct FakeLibrary;

/// Loader whose only library is the fake engine above.
#[derive(Debug)]
pub struct FakePlatform {
    pub conventions: PathConventions,
    pub missing_library: bool,
    pub missing_symbol: Option<&'static str>,
    pub fail_unload: bool,
    /// Directory listing to report instead of reading the filesystem.
    pub entries: Option<Vec<OsString>>,
    pub(crate) loads: Cell<usize>,
    pub(crate) unloads: Cell<usize>,
    pub(crate) frees: Cell<usize>,
    pub(crate) loaded: RefCell<Vec<PathBuf>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        FakePlatform {
            conventions: PathConventions::native(),
            missing_library: false,
            missing_symbol: None,
            fail_unload: false,
            entries: None,
            loads: Cell::new(0),
            unloads: Cell::new(0),
            frees: Cell::new(0),
            loaded: RefCell::new(Vec::new()),
        }
    }
}

impl FakePlatform {
    pub fn loads(&self) -> usize {
        self.loads.get()
    }

    pub fn unloads(&self) -> usize {
        self.unloads.get()
    }

    pub fn frees(&self) -> usize {
        self.frees.get()
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.loaded.borrow().clone()
    }
}

impl Platform for FakePlatform {
    type Library = FakeLibrary;

    fn conventions(&self) -> PathConventions {
        self.conventions
    }

    fn load_library(&self, path: &Path) -> Result<FakeLibrary, LoadError> {
        if self.missing_library {
            return Err(LoadError::NotFound);
        }
        self.loads.set(self.loads.get() + 1);
        self.loaded.borrow_mut().push(path.to_path_buf());
        Ok(FakeLibrary)
    }

    fn resolve_symbol(&self, _library: &FakeLibrary, name: &str) -> Option<NonNull<c_void>> {
        if self.missing_symbol == Some(name) {
            return None;
        }
        let address = match name {
            INITIALIZE => fake_initialize as CoreClrInitializeFn as *mut c_void,
            CREATE_DELEGATE => fake_create_delegate as CoreClrCreateDelegateFn as *mut c_void,
            SHUTDOWN => fake_shutdown as CoreClrShutdownFn as *mut c_void,
            _ => return None,
        };
        NonNull::new(address)
    }

    fn unload_library(&self, _library: FakeLibrary) -> Result<(), UnloadError> {
        self.unloads.set(self.unloads.get() + 1);
        if self.fail_unload {
            return Err(UnloadError("library is still in use".to_string()));
        }
        Ok(())
    }

    unsafe fn free_managed(&self, ptr: NonNull<c_char>) {
        self.frees.set(self.frees.get() + 1);
        platform::NativePlatform.free_managed(ptr);
    }

    fn read_dir_names(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        match &self.entries {
            Some(entries) => Ok(entries.clone()),
            None => platform::NativePlatform.read_dir_names(dir),
        }
    }
}
