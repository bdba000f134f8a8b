//! Native signatures shared with the managed `ManagedWorker.DoWork` method.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr::NonNull;

use tracing::info;

use crate::error::{HostError, Result};
use crate::platform::Platform;

/// Callback managed code uses to report progress back to the host.
pub type ReportProgressFn = unsafe extern "C" fn(progress: c_int) -> c_int;

/// Managed entry point: `string DoWork(string jobName, int iterations, int dataSize, double[] data, ReportProgress callback)`.
pub type DoWorkFn = unsafe extern "C" fn(
    job_name: *const c_char,
    iterations: c_int,
    data_size: c_int,
    data: *mut c_double,
    callback: ReportProgressFn,
) -> *mut c_char;

/// Logs the progress managed code reported and acknowledges it with its negation.
pub extern "C" fn report_progress(progress: c_int) -> c_int {
    info!("Received status from managed code: {}", progress);
    progress.wrapping_neg()
}

/// Arguments of a single `DoWork` call.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub name: String,
    pub iterations: i32,
    pub data: Vec<f64>,
}

impl Default for WorkItem {
    fn default() -> Self {
        WorkItem {
            name: "Test job".to_string(),
            iterations: 5,
            data: vec![0.0, 0.25, 0.5, 0.75],
        }
    }
}

/// A delegate into managed code. Borrowing the engine keeps it from outliving shutdown.
pub struct ManagedDelegate<'engine> {
    function: DoWorkFn,
    phantom: PhantomData<&'engine ()>,
}

impl<'engine> ManagedDelegate<'engine> {
    /// # Safety
    /// `ptr` must be a function with the `DoWorkFn` signature, valid for `'engine`.
    pub(crate) unsafe fn from_raw(ptr: NonNull<c_void>) -> Self {
        ManagedDelegate {
            function: mem::transmute::<*mut c_void, DoWorkFn>(ptr.as_ptr()),
            phantom: PhantomData,
        }
    }

    /// Run `job` in managed code. The returned string is freed through `platform` when dropped.
    pub fn invoke<'p, P: Platform + ?Sized>(
        &self,
        platform: &'p P,
        job: &WorkItem,
        callback: ReportProgressFn,
    ) -> Result<ManagedString<'p, P>> {
        let name = CString::new(job.name.as_str())?;
        let mut data = job.data.clone();
        let data_size = c_int::try_from(data.len()).map_err(|_| HostError::Overflow("job data"))?;

        let ret = unsafe {
            (self.function)(name.as_ptr(), job.iterations, data_size, data.as_mut_ptr(), callback)
        };

        let ptr = NonNull::new(ret).ok_or(HostError::NullResult)?;
        Ok(ManagedString { ptr, platform })
    }
}

impl fmt::Debug for ManagedDelegate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagedDelegate")
            .field(&(self.function as *const c_void))
            .finish()
    }
}

/// A nul-terminated string allocated by managed code. Freed exactly once, on drop.
pub struct ManagedString<'p, P: Platform + ?Sized> {
    ptr: NonNull<c_char>,
    platform: &'p P,
}

impl<P: Platform + ?Sized> ManagedString<'_, P> {
    pub fn as_c_str(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        self.as_c_str().to_string_lossy()
    }
}

impl<P: Platform + ?Sized> fmt::Display for ManagedString<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<P: Platform + ?Sized> fmt::Debug for ManagedString<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagedString").field(&self.ptr).finish()
    }
}

impl<P: Platform + ?Sized> Drop for ManagedString<'_, P> {
    fn drop(&mut self) {
        unsafe { self.platform.free_managed(self.ptr) };
    }
}
