//! The hosting sequence: load CoreCLR, start it, call into managed code, tear everything down.

use tracing::{error, info, trace, warn};

use crate::bridge::report_progress;
use crate::config::{AppPaths, HostConfig, APP_PATHS, TRUSTED_PLATFORM_ASSEMBLIES};
use crate::coreclr::{Engine, EntryPoints, PropertyList};
use crate::error::{HostError, Result};
use crate::platform::Platform;
use crate::tpa::{build_tpa_list, AssemblyList};

/// Lifecycle stages, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unstarted,
    LibraryLoaded,
    EntryPointsResolved,
    Initialized,
    DelegateBound,
    Invoked,
    ShutDown,
    LibraryUnloaded,
}

/// Outcome of a run that got CoreCLR started.
#[derive(Debug)]
pub struct RunReport {
    /// Furthest stage reached.
    pub stage: Stage,
    pub managed_result: Option<String>,
    /// Failures after initialization, in the order they happened. None of them stopped cleanup.
    pub failures: Vec<HostError>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives one CoreCLR session. Built once, consumed by [`Host::run`].
pub struct Host<'p, P: Platform> {
    platform: &'p P,
    config: HostConfig,
    stage: Stage,
    managed_result: Option<String>,
    failures: Vec<HostError>,
}

impl<'p, P: Platform> Host<'p, P> {
    pub fn new(platform: &'p P, config: HostConfig) -> Self {
        Host {
            platform,
            config,
            stage: Stage::Unstarted,
            managed_result: None,
            failures: Vec::new(),
        }
    }

    /// Run the whole sequence.
    ///
    /// Fails only when CoreCLR could not be loaded, resolved or started. Once loaded, the library
    /// is always unloaded; once started, the runtime is always shut down.
    pub fn run(mut self) -> Result<RunReport> {
        let library_path = self.config.engine_library_path(&self.platform.conventions());
        let library = match self.platform.load_library(&library_path) {
            Ok(library) => library,
            Err(source) => {
                let err = HostError::Load {
                    path: library_path,
                    source,
                };
                error!("{}", err);
                return Err(err);
            }
        };
        info!("Loaded CoreCLR from {}", library_path.display());
        self.advance(Stage::LibraryLoaded);

        let outcome = self.run_loaded(&library);
        if let Err(e) = &outcome {
            error!("{}", e);
        }

        match self.platform.unload_library(library) {
            Ok(()) => {
                info!("Unloaded CoreCLR");
                self.advance(Stage::LibraryUnloaded);
            }
            Err(e) => self.degrade(HostError::Unload(e)),
        }

        outcome?;
        Ok(RunReport {
            stage: self.stage,
            managed_result: self.managed_result,
            failures: self.failures,
        })
    }

    fn run_loaded(&mut self, library: &P::Library) -> Result<()> {
        // Dropped before the caller unloads `library`.
        let entry_points = unsafe { EntryPoints::resolve(self.platform, library)? };
        self.advance(Stage::EntryPointsResolved);

        let paths = self.config.app_paths()?;
        let tpa = self.trusted_assemblies(&paths);
        let properties = self.properties(&paths, &tpa)?;

        let engine = Engine::initialize(
            &entry_points,
            &paths.exe_path,
            &self.config.app_domain_name,
            &properties,
        )?;
        info!("CoreCLR started");
        self.advance(Stage::Initialized);

        if let Err(e) = self.call_managed(&engine) {
            self.degrade(e);
        }

        match engine.shutdown() {
            Ok(_) => {
                info!("CoreCLR successfully shutdown");
                self.advance(Stage::ShutDown);
            }
            Err(e) => self.degrade(e),
        }
        Ok(())
    }

    fn call_managed(&mut self, engine: &Engine<'_>) -> Result<()> {
        let platform = self.platform;
        let delegate = engine.create_delegate(
            &self.config.assembly_name,
            &self.config.type_name,
            &self.config.method_name,
        )?;
        info!("Managed delegate created");
        self.advance(Stage::DelegateBound);

        let ret = delegate.invoke(platform, &self.config.job, report_progress)?;
        let text = ret.to_string();
        info!("Managed code returned: {}", text);
        self.managed_result = Some(text);
        self.advance(Stage::Invoked);
        Ok(())
    }

    fn trusted_assemblies(&self, paths: &AppPaths) -> AssemblyList {
        build_tpa_list(self.platform, &paths.app_dir, &self.config.tpa_extension).unwrap_or_else(|e| {
            warn!("unable to scan {} for assemblies: {}", paths.app_dir, e);
            AssemblyList::empty(self.platform.conventions().delimiter)
        })
    }

    fn properties(&self, paths: &AppPaths, tpa: &AssemblyList) -> Result<PropertyList> {
        let mut properties = PropertyList::new();
        properties.push(APP_PATHS, &paths.app_dir)?;
        properties.push_os(TRUSTED_PLATFORM_ASSEMBLIES, &tpa.joined())?;
        for (key, value) in &self.config.extra_properties {
            properties.push(key, value)?;
        }
        Ok(properties)
    }

    fn advance(&mut self, to: Stage) {
        debug_assert!(to > self.stage, "cannot move from {:?} to {:?}", self.stage, to);
        trace!(from = ?self.stage, to = ?to, "lifecycle transition");
        self.stage = to;
    }

    fn degrade(&mut self, error: HostError) {
        warn!("{}", error);
        self.failures.push(error);
    }
}
