//! Version-scoped installs of compiler plugins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::effects::GoTool;
use crate::error::PbgenError;
use crate::fs::create_dir_all;

pub const GO_PLUGIN_PACKAGE: &str = "google.golang.org/protobuf/cmd/protoc-gen-go";
pub const GRPC_MODULE: &str = "google.golang.org/grpc";
pub const GRPC_PLUGIN_PACKAGE: &str = "google.golang.org/grpc/cmd/protoc-gen-go-grpc";

/// How a plugin's install version is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// The version of the module that owns the plugin package in the current build graph.
    Graph,
    /// A fixed version, installed only when `module` is part of the build graph.
    Pinned { module: String, version: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Executable name, also the install subdirectory (`protoc-gen-go`).
    pub name: String,
    pub package: String,
    pub version: VersionSource,
}

impl Plugin {
    #[must_use]
    pub fn protoc_gen_go() -> Self {
        Self {
            name: "protoc-gen-go".to_string(),
            package: GO_PLUGIN_PACKAGE.to_string(),
            version: VersionSource::Graph,
        }
    }

    #[must_use]
    pub fn protoc_gen_go_grpc(version: impl Into<String>) -> Self {
        Self {
            name: "protoc-gen-go-grpc".to_string(),
            package: GRPC_PLUGIN_PACKAGE.to_string(),
            version: VersionSource::Pinned {
                module: GRPC_MODULE.to_string(),
                version: version.into(),
            },
        }
    }
}

pub struct PluginInstaller<'a> {
    go: &'a dyn GoTool,
    root: PathBuf,
}

impl<'a> PluginInstaller<'a> {
    /// Installs land in `<cache_root>/<plugin name>/<version>`.
    #[must_use]
    pub fn new(go: &'a dyn GoTool, cache_root: &Path) -> Self {
        Self {
            go,
            root: cache_root.to_path_buf(),
        }
    }

    #[must_use]
    pub fn install_dir(&self, plugin: &Plugin, version: &str) -> PathBuf {
        self.root.join(&plugin.name).join(version)
    }

    /// Installs `plugin` and returns its install directory.
    ///
    /// When `require_resolvable` is false and the plugin's module is not in the build graph,
    /// returns `Ok(None)`: the feature was simply not requested. Installs always run, even when
    /// the target directory already holds a binary.
    ///
    /// # Errors
    /// Returns graph errors for required plugins and subprocess errors from `go install`.
    pub fn install(&self, plugin: &Plugin, require_resolvable: bool) -> Result<Option<PathBuf>> {
        let Some((spec, version)) = self.resolve(plugin, require_resolvable)? else {
            return Ok(None);
        };
        let dir = self.install_dir(plugin, &version);
        create_dir_all(&dir)?;
        self.go
            .install(&spec, &dir)
            .with_context(|| format!("installing {} into {}", plugin.name, dir.display()))?;
        info!(plugin = %plugin.name, %version, dest = %dir.display(), "plugin installed");
        Ok(Some(dir))
    }

    /// Returns the `go install` spec and the directory version.
    fn resolve(&self, plugin: &Plugin, require_resolvable: bool) -> Result<Option<(String, String)>> {
        match &plugin.version {
            VersionSource::Graph => {
                let pkg = self.go.list_package(&plugin.package, &[])?;
                if let Some(err) = pkg.error() {
                    if require_resolvable {
                        return Err(PbgenError::graph(&plugin.package, err).into());
                    }
                    warn!(package = %plugin.package, %err, "plugin not in build graph; skipping");
                    return Ok(None);
                }
                let version = pkg
                    .resolved_module()
                    .and_then(|module| module.version())
                    .ok_or_else(|| {
                        PbgenError::graph(&plugin.package, "owning module has no version")
                    })?;
                info!(package = %plugin.package, %version, "plugin found");
                Ok(Some((plugin.package.clone(), version.to_string())))
            }
            VersionSource::Pinned { module, version } => {
                let found = self.go.list_module(module)?;
                if let Some(err) = &found.error {
                    if require_resolvable {
                        return Err(PbgenError::graph(module, err).into());
                    }
                    warn!(%module, "module not in build graph; {} disabled", plugin.name);
                    return Ok(None);
                }
                info!(%module, version = found.version().unwrap_or("(main)"), "module found");
                Ok(Some((
                    format!("{}@v{version}", plugin.package),
                    version.clone(),
                )))
            }
        }
    }
}

/// Path of an installed plugin executable, including the platform suffix.
#[must_use]
pub fn binary_path(install_dir: &Path, plugin: &Plugin, exe_suffix: &str) -> PathBuf {
    install_dir.join(format!("{}{exe_suffix}", plugin.name))
}
