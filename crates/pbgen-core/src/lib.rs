//! Toolchain provisioning and protoc orchestration behind `pbgen`.
//!
//! [`Generator::run`] drives one `go generate` directive end to end:
//!
//! 1. resolve the gen-file package and its module through the [`GoTool`] seam;
//! 2. in parallel, provision the protoc distribution, install the plugins and look up the
//!    source directory of every import;
//! 3. stage the argument file, clean configured output directories and run `protoc @file`.

pub mod archive;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod distribution;
pub mod effects;
mod error;
mod fs;
pub mod generator;
pub mod ide;
pub mod invocation;
pub mod plugins;
mod process;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use config::{resolve_cache_root, CacheLocation, GeneratorConfig};
pub use distribution::{Distribution, DistributionCache};
pub use effects::{GoTool, SystemGo};
pub use error::{ArchiveIssue, PbgenError};
pub use generator::{GenerateSummary, Generator};
pub use invocation::{DescriptorSetOptions, InvocationSpec, OutputTarget, PluginBinding};
pub use plugins::{Plugin, PluginInstaller, VersionSource};

pub use pbgen_domain::{ModuleDescriptor, PackageDescriptor, PlatformTag, DEFAULT_DOWNLOAD_URL};
