//! Data model shared by the pbgen pipeline.
//!
//! Nothing in this crate touches the filesystem, the network or child processes; the
//! descriptors are decoded from bytes handed over by `pbgen-core`.

mod descriptor;
mod distribution;

pub use descriptor::{ModuleDescriptor, ModuleError, PackageDescriptor, PackageError};
pub use distribution::{
    render_download_url, DistributionKey, PlatformTag, TemplateError, UnsupportedPlatform,
    DEFAULT_DOWNLOAD_URL,
};
