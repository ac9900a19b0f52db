use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use pbgen_domain::{PackageDescriptor, PlatformTag};
use serde::Serialize;
use tracing::{info, warn};

use crate::compiler;
use crate::config::{resolve_cache_root, GeneratorConfig};
use crate::distribution::DistributionCache;
use crate::effects::{GoTool, SystemGo};
use crate::error::PbgenError;
use crate::ide::{spawn_sync, IdeSync};
use crate::invocation::{
    clean_dirs, discover_schema_files, staging_file, InvocationSpec, OutputTarget, PluginBinding,
};
use crate::plugins::{binary_path, Plugin, PluginInstaller};
use crate::resolver::{resolve_search_paths, GENERATE_TAG};

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateSummary {
    pub package: String,
    pub module: String,
    pub args_file: PathBuf,
    pub compiler: PathBuf,
    pub plugins: Vec<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub schema_files: usize,
}

/// The generation pipeline for one `go generate` directive.
pub struct Generator {
    config: GeneratorConfig,
    go: Arc<dyn GoTool>,
    cache_root: PathBuf,
    distribution: DistributionCache,
}

impl Generator {
    /// Uses the `go` binary from the environment and the resolved cache root.
    ///
    /// # Errors
    /// Returns an error when `go` cannot be found or no cache root can be determined.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let go = SystemGo::detect()?;
        let cache = resolve_cache_root(config.cache_root.as_deref())?;
        info!(path = %cache.path.display(), source = cache.source, "toolchain cache");
        Ok(Self::with_go_tool(config, Arc::new(go), cache.path))
    }

    #[must_use]
    pub fn with_go_tool(config: GeneratorConfig, go: Arc<dyn GoTool>, cache_root: PathBuf) -> Self {
        let distribution = DistributionCache::new(
            &cache_root,
            config.protoc_download_url.clone(),
            config.protoc_version.clone(),
        );
        Self {
            config,
            go,
            cache_root,
            distribution,
        }
    }

    /// Pins the distribution platform instead of reading `GOOS`/`GOARCH` and the host.
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformTag) -> Self {
        self.distribution = self.distribution.with_platform(platform);
        self
    }

    /// Provisions the toolchain, stages the argument file and runs the compiler.
    ///
    /// # Errors
    /// Any failure in provisioning, resolution, cleanup or compilation stops the run. IDE sync
    /// failures are only logged.
    pub fn run(&self) -> Result<GenerateSummary> {
        // Overflow means no deadline.
        let deadline = self
            .config
            .timeout
            .and_then(|budget| Instant::now().checked_add(budget));
        let gen_file = self
            .config
            .gen_file
            .as_deref()
            .filter(|file| !file.is_empty())
            .ok_or_else(|| anyhow!("no gen file: run under `go generate` or pass --gen-file"))?;

        let gen_pkg = self.list_resolved(gen_file)?;
        let package_dir = gen_pkg
            .source_dir()
            .ok_or_else(|| PbgenError::graph(gen_file, "package has no source directory"))?
            .to_path_buf();
        let pkg = self.list_resolved(&package_dir.to_string_lossy())?;
        let module = pkg
            .resolved_module()
            .ok_or_else(|| PbgenError::graph(pkg.import_path(), "package has no owning module"))?;
        let output = OutputTarget {
            dir: module
                .root_dir()
                .ok_or_else(|| PbgenError::graph(module.path(), "module has no root directory"))?
                .to_path_buf(),
            module: module.path().to_string(),
        };

        let go = self.go.as_ref();
        let installer = PluginInstaller::new(go, &self.cache_root);
        let base_plugin = Plugin::protoc_gen_go();
        let grpc_plugin = Plugin::protoc_gen_go_grpc(&self.config.grpc_plugin_version);

        let (distribution, base_dir, grpc_dir, import_dirs) = thread::scope(|scope| {
            let distribution = scope.spawn(|| self.distribution.ensure(deadline));
            let base = scope.spawn(|| installer.install(&base_plugin, true));
            let grpc = scope.spawn(|| installer.install(&grpc_plugin, false));
            let imports = scope.spawn(|| resolve_search_paths(go, &gen_pkg.imports));
            (
                joined(distribution.join(), "protoc distribution"),
                joined(base.join(), "protoc-gen-go install"),
                joined(grpc.join(), "protoc-gen-go-grpc install"),
                joined(imports.join(), "import resolution"),
            )
        });
        let distribution = distribution.context("provisioning protoc")?;
        let base_dir = base_dir
            .context("installing protoc-gen-go")?
            .ok_or_else(|| anyhow!("protoc-gen-go install produced no directory"))?;
        let grpc_dir = grpc_dir.context("installing protoc-gen-go-grpc")?;
        let import_dirs = import_dirs.context("resolving import directories")?;
        let exe_suffix = go.exe_suffix()?;

        let _ide = if self.config.disable_ide {
            IdeSync::disabled()
        } else {
            spawn_sync(
                pkg.source_dir().unwrap_or(&package_dir).to_path_buf(),
                pkg.import_path().to_string(),
                import_dirs.clone(),
            )
        };

        let proto_dir = self.config.proto_dir_in(&package_dir);
        let mut search_paths = import_dirs;
        search_paths.push(proto_dir.clone());
        search_paths.push(distribution.include_dir());

        let mut plugins = vec![PluginBinding::new(
            &base_plugin.name,
            binary_path(&base_dir, &base_plugin, &exe_suffix),
        )];
        let mut plugin_dirs = vec![base_dir];
        if let Some(dir) = grpc_dir {
            plugins.push(PluginBinding::new(
                &grpc_plugin.name,
                binary_path(&dir, &grpc_plugin, &exe_suffix),
            ));
            plugin_dirs.push(dir);
        }

        let spec = InvocationSpec {
            search_paths,
            descriptor_set: self.config.descriptor_set(),
            output,
            plugins,
            extra_options: self.config.custom_protoc_opts.clone(),
            schema_files: discover_schema_files(&proto_dir)
                .with_context(|| format!("collecting schema files in {}", proto_dir.display()))?,
        };
        if spec.schema_files.is_empty() {
            warn!(dir = %proto_dir.display(), "no schema files found");
        }

        clean_dirs(&self.config.clean_dirs_in(&package_dir))?;
        let args_file = staging_file(pkg.import_path());
        spec.stage(&args_file)?;
        let compiler = distribution.compiler();
        compiler::invoke(&compiler, &args_file, &plugin_dirs)?;

        Ok(GenerateSummary {
            package: pkg.import_path().to_string(),
            module: spec.output.module.clone(),
            args_file,
            compiler,
            plugins: spec.plugins.iter().map(|p| p.binary.clone()).collect(),
            search_paths: spec.search_paths.clone(),
            schema_files: spec.schema_files.len(),
        })
    }

    /// `go list` with the generate tag, failing on a structured package error.
    fn list_resolved(&self, pattern: &str) -> Result<PackageDescriptor> {
        let pkg = self.go.list_package(pattern, &[GENERATE_TAG])?;
        if let Some(err) = pkg.error() {
            return Err(PbgenError::graph(pattern, err).into());
        }
        info!(%pattern, package = pkg.import_path(), "package resolved");
        Ok(pkg)
    }
}

fn joined<T>(outcome: thread::Result<Result<T>>, task: &str) -> Result<T> {
    outcome.map_err(|_| anyhow!("{task} thread panicked"))?
}
