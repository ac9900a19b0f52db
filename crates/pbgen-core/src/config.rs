//! Generator settings and cache-root resolution.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use dirs_next::{cache_dir, home_dir};
use pbgen_domain::DEFAULT_DOWNLOAD_URL;
use serde::{Deserialize, Serialize};

use crate::fs::absolutize;
use crate::invocation::DescriptorSetOptions;

pub const CACHE_DIR_ENV: &str = "PBGEN_CACHE_DIR";
/// Set by `go generate` to the file holding the directive.
pub const GEN_FILE_ENV: &str = "GOFILE";

pub const DEFAULT_PROTOC_VERSION: &str = "27.2";
pub const DEFAULT_GRPC_PLUGIN_VERSION: &str = "1.4.0";
pub const DEFAULT_PROTO_DIR: &str = "proto";
pub const DEFAULT_CLEAN_DIR: &str = "proto_gen_go";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub gen_file: Option<String>,
    pub proto_dir: PathBuf,
    pub protoc_download_url: String,
    pub protoc_version: String,
    pub grpc_plugin_version: String,
    pub clean_dir: String,
    pub custom_protoc_opts: Vec<String>,
    pub descriptor_set_out: Option<PathBuf>,
    pub include_imports: bool,
    pub include_source_info: bool,
    pub disable_ide: bool,
    pub cache_root: Option<PathBuf>,
    /// Overall budget for one run; bounds the distribution download.
    pub timeout: Option<Duration>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            gen_file: env::var(GEN_FILE_ENV).ok().filter(|value| !value.is_empty()),
            proto_dir: PathBuf::from(DEFAULT_PROTO_DIR),
            protoc_download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            protoc_version: DEFAULT_PROTOC_VERSION.to_string(),
            grpc_plugin_version: DEFAULT_GRPC_PLUGIN_VERSION.to_string(),
            clean_dir: DEFAULT_CLEAN_DIR.to_string(),
            custom_protoc_opts: Vec::new(),
            descriptor_set_out: None,
            include_imports: false,
            include_source_info: false,
            disable_ide: false,
            cache_root: None,
            timeout: None,
        }
    }
}

impl GeneratorConfig {
    /// Schema directory, resolved against `package_dir` when relative.
    #[must_use]
    pub fn proto_dir_in(&self, package_dir: &Path) -> PathBuf {
        if self.proto_dir.is_absolute() {
            self.proto_dir.clone()
        } else {
            package_dir.join(&self.proto_dir)
        }
    }

    /// Clean-list entries, trimmed, with relative entries resolved against `package_dir`.
    #[must_use]
    pub fn clean_dirs_in(&self, package_dir: &Path) -> Vec<PathBuf> {
        self.clean_dir
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let path = Path::new(entry);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    package_dir.join(path)
                }
            })
            .collect()
    }

    #[must_use]
    pub fn descriptor_set(&self) -> Option<DescriptorSetOptions> {
        self.descriptor_set_out
            .as_ref()
            .filter(|out| !out.as_os_str().is_empty())
            .map(|out| DescriptorSetOptions {
                out: out.clone(),
                include_imports: self.include_imports,
                include_source_info: self.include_source_info,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Resolves the toolchain cache root.
///
/// Precedence: explicit override, `PBGEN_CACHE_DIR`, the platform cache directory, then
/// `~/.cache`.
///
/// # Errors
/// Returns an error when no candidate location can be determined.
pub fn resolve_cache_root(explicit: Option<&Path>) -> Result<CacheLocation> {
    if let Some(path) = explicit {
        return Ok(CacheLocation {
            path: absolutize(path)?,
            source: "--cache-dir",
        });
    }
    if let Some(value) = env::var_os(CACHE_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(CacheLocation {
            path: absolutize(Path::new(&value))?,
            source: CACHE_DIR_ENV,
        });
    }
    if let Some(base) = cache_dir() {
        return Ok(CacheLocation {
            path: base.join("pbgen"),
            source: "platform cache dir",
        });
    }
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok(CacheLocation {
        path: home.join(".cache").join("pbgen"),
        source: "~/.cache",
    })
}
