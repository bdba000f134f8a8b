//! A native host for CoreCLR.
//!
//! Loads `libcoreclr` through its C hosting API, starts the runtime with every assembly next
//! to the host as a trusted platform assembly, calls a static managed method through a
//! delegate, and shuts the runtime down again.

pub mod bridge;
pub mod config;
pub mod coreclr;
pub mod error;
pub mod host;
pub mod platform;
pub mod tpa;

#[cfg(test)]
pub(crate) mod testing;

pub use config::HostConfig;
pub use error::{HostError, Result, Status};
pub use host::{Host, RunReport, Stage};
pub use platform::{NativePlatform, PathConventions, Platform};
