//! Host settings: where CoreCLR lives, which managed method to call and with what.

use std::io;
use std::path::{Path, PathBuf};

use crate::bridge::WorkItem;
use crate::error::{HostError, Result};
use crate::platform::{self, PathConventions};

pub const APP_PATHS: &str = "APP_PATHS";
pub const TRUSTED_PLATFORM_ASSEMBLIES: &str = "TRUSTED_PLATFORM_ASSEMBLIES";

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Directory containing the CoreCLR shared library.
    pub engine_dir: PathBuf,
    /// Application base and assembly scan directory. Defaults to the executable's directory.
    pub app_dir: Option<PathBuf>,
    pub app_domain_name: String,
    pub assembly_name: String,
    pub type_name: String,
    pub method_name: String,
    /// Suffix of the files added to the trusted assembly list.
    pub tpa_extension: String,
    /// Extra runtime properties, passed after `APP_PATHS` and `TRUSTED_PLATFORM_ASSEMBLIES`.
    pub extra_properties: Vec<(String, String)>,
    pub job: WorkItem,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            engine_dir: PathBuf::from("."),
            app_dir: None,
            app_domain_name: "host".to_string(),
            assembly_name: "ManagedLibrary, Version=1.0.0.0".to_string(),
            type_name: "ManagedLibrary.ManagedWorker".to_string(),
            method_name: "DoWork".to_string(),
            tpa_extension: ".dll".to_string(),
            extra_properties: Vec::new(),
            job: WorkItem::default(),
        }
    }
}

/// Paths handed to `coreclr_initialize`, as UTF-8 strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub exe_path: String,
    pub app_dir: String,
}

impl HostConfig {
    pub fn engine_library_path(&self, conventions: &PathConventions) -> PathBuf {
        self.engine_dir.join(conventions.engine_library)
    }

    pub fn app_paths(&self) -> Result<AppPaths> {
        let exe = platform::current_exe_path().map_err(HostError::ExecutablePath)?;
        let app_dir = match &self.app_dir {
            Some(dir) => dir.clone(),
            None => exe.parent().map(Path::to_path_buf).ok_or_else(|| {
                HostError::ExecutablePath(io::Error::new(
                    io::ErrorKind::NotFound,
                    "executable has no parent directory",
                ))
            })?,
        };

        Ok(AppPaths {
            exe_path: utf8(exe)?,
            app_dir: utf8(app_dir)?,
        })
    }
}

fn utf8(path: PathBuf) -> Result<String> {
    path.into_os_string()
        .into_string()
        .map_err(|raw| HostError::NonUtf8Path(PathBuf::from(raw)))
}

/// Parse a `KEY=VALUE` runtime property.
pub fn parse_property(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("property name is empty in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
