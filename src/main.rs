use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clrhost::bridge::WorkItem;
use clrhost::config::parse_property;
use clrhost::{Host, HostConfig, NativePlatform};

/// Exit status for a fatal failure; the shell sees the host's `-1`.
const FATAL: u8 = 255;

/// Start CoreCLR and call into a managed method.
#[derive(Parser, Debug)]
#[command(name = "clrhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the CoreCLR shared library.
    #[arg(default_value = ".")]
    coreclr_dir: PathBuf,

    /// Application directory scanned for trusted assemblies (defaults to the host's directory).
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// AppDomain friendly name.
    #[arg(long, default_value = "host")]
    domain_name: String,

    /// Full name of the assembly containing the entry point.
    #[arg(long, default_value = "ManagedLibrary, Version=1.0.0.0")]
    assembly: String,

    /// Type containing the entry point.
    #[arg(long, default_value = "ManagedLibrary.ManagedWorker")]
    type_name: String,

    /// Static method to call.
    #[arg(long, default_value = "DoWork")]
    method: String,

    /// Suffix of the files added to the trusted assembly list.
    #[arg(long, default_value = ".dll")]
    extension: String,

    /// Extra runtime property, KEY=VALUE. May be repeated.
    #[arg(long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Job name passed to managed code.
    #[arg(long, default_value = "Test job")]
    job_name: String,

    /// Iterations requested from managed code.
    #[arg(long, default_value_t = 5)]
    iterations: i32,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> HostConfig {
        HostConfig {
            engine_dir: self.coreclr_dir,
            app_dir: self.app_dir,
            app_domain_name: self.domain_name,
            assembly_name: self.assembly,
            type_name: self.type_name,
            method_name: self.method,
            tpa_extension: self.extension,
            extra_properties: self.properties,
            job: WorkItem {
                name: self.job_name,
                iterations: self.iterations,
                ..WorkItem::default()
            },
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let json_logging = std::env::var("CLRHOST_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "clrhost=debug" } else { "clrhost=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))?;

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose) {
        eprintln!("failed to initialize logging: {e:#}");
    }

    let platform = NativePlatform;
    match Host::new(&platform, args.into_config()).run() {
        Ok(report) => {
            tracing::debug!(stage = ?report.stage, failures = report.failures.len(), "host finished");
            ExitCode::SUCCESS
        }
        // Already logged by the host.
        Err(_) => ExitCode::from(FATAL),
    }
}
