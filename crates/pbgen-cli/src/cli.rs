use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use pbgen_core::cache::CacheKind;
use pbgen_core::config::{
    DEFAULT_CLEAN_DIR, DEFAULT_GRPC_PLUGIN_VERSION, DEFAULT_PROTOC_VERSION, DEFAULT_PROTO_DIR,
};
use pbgen_core::{GeneratorConfig, DEFAULT_DOWNLOAD_URL};

#[derive(Parser, Debug)]
#[command(
    name = "pbgen",
    version,
    about = "Provision protoc and the Go plugins, then compile a package's .proto files",
    override_usage = "pbgen [OPTIONS] [COMMAND]",
    after_help = "Examples:\n  //go:generate go run example.com/pbgen\n  pbgen --proto-dir api --clean-dir gen\n  pbgen cache info\n  pbgen cache prune --kind protoc"
)]
pub struct PbgenCli {
    #[arg(
        short,
        long,
        global = true,
        help = "Only print warnings and the final result"
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v debug, -vv trace)"
    )]
    pub verbose: u8,
    #[arg(long, global = true, help = "Log everything, including trace events")]
    pub trace: bool,
    #[arg(long, global = true, help = "Emit the result as JSON on stdout")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Option<PbgenCommand>,
    #[command(flatten)]
    pub generate: GenerateArgs,
}

impl PbgenCli {
    /// The command to run; a bare invocation generates.
    #[must_use]
    pub fn resolved_command(&self) -> PbgenCommand {
        self.command
            .clone()
            .unwrap_or_else(|| PbgenCommand::Generate(self.generate.clone()))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum PbgenCommand {
    #[command(about = "Compile the package's schema files (the default)")]
    Generate(GenerateArgs),
    #[command(subcommand, about = "Inspect or clear the toolchain cache")]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(
        long,
        env = "GOFILE",
        value_name = "FILE",
        help = "Go file whose imports seed the search paths (set by go generate)"
    )]
    pub gen_file: Option<String>,
    #[arg(
        long,
        env = "PBGEN_PROTO_DIR",
        default_value = DEFAULT_PROTO_DIR,
        value_name = "DIR",
        help = "Directory holding the .proto files, relative to the package"
    )]
    pub proto_dir: PathBuf,
    #[arg(
        long = "protoc-dl-url",
        env = "PBGEN_PROTOC_DL_URL",
        default_value = DEFAULT_DOWNLOAD_URL,
        value_name = "TEMPLATE",
        help = "Download URL template using {version} and {os_arch}"
    )]
    pub protoc_download_url: String,
    #[arg(
        long = "protoc-ver",
        env = "PBGEN_PROTOC_VER",
        default_value = DEFAULT_PROTOC_VERSION,
        value_name = "VERSION",
        help = "protoc release to provision"
    )]
    pub protoc_version: String,
    #[arg(
        long = "grpc-ver",
        env = "PBGEN_GRPC_VER",
        default_value = DEFAULT_GRPC_PLUGIN_VERSION,
        value_name = "VERSION",
        help = "protoc-gen-go-grpc release, used when the module depends on grpc"
    )]
    pub grpc_plugin_version: String,
    #[arg(
        long,
        env = "PBGEN_CLEAN_DIR",
        default_value = DEFAULT_CLEAN_DIR,
        value_name = "DIRS",
        help = "Comma separated directories removed before compiling"
    )]
    pub clean_dir: String,
    #[arg(
        long = "protoc-opt",
        env = "PBGEN_PROTOC_OPT",
        value_name = "OPT",
        allow_hyphen_values = true,
        help = "Extra protoc argument line (repeatable)"
    )]
    pub custom_protoc_opts: Vec<String>,
    #[arg(
        long = "desc-out-file",
        env = "PBGEN_DESC_OUT_FILE",
        value_name = "FILE",
        help = "Also write a FileDescriptorSet to this path"
    )]
    pub descriptor_set_out: Option<PathBuf>,
    #[arg(
        long = "desc-include-imports",
        env = "PBGEN_DESC_INCLUDE_IMPORTS",
        help = "Include imported files in the descriptor set"
    )]
    pub include_imports: bool,
    #[arg(
        long = "desc-include-source-info",
        env = "PBGEN_DESC_INCLUDE_SOURCE_INFO",
        help = "Keep source info in the descriptor set"
    )]
    pub include_source_info: bool,
    #[arg(
        long,
        env = "PBGEN_DISABLE_IDE",
        help = "Skip updating .idea/protoeditor.xml"
    )]
    pub disable_ide: bool,
    #[arg(
        long,
        value_name = "DIR",
        help = "Toolchain cache root (default: $PBGEN_CACHE_DIR, then the platform cache dir)"
    )]
    pub cache_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "PBGEN_TIMEOUT",
        value_name = "SECS",
        help = "Overall time budget; bounds the protoc download"
    )]
    pub timeout: Option<u64>,
}

impl GenerateArgs {
    #[must_use]
    pub fn to_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            gen_file: self.gen_file.clone().filter(|value| !value.is_empty()),
            proto_dir: self.proto_dir.clone(),
            protoc_download_url: self.protoc_download_url.clone(),
            protoc_version: self.protoc_version.clone(),
            grpc_plugin_version: self.grpc_plugin_version.clone(),
            clean_dir: self.clean_dir.clone(),
            custom_protoc_opts: self.custom_protoc_opts.clone(),
            descriptor_set_out: self.descriptor_set_out.clone(),
            include_imports: self.include_imports,
            include_source_info: self.include_source_info,
            disable_ide: self.disable_ide,
            cache_root: self.cache_dir.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    #[command(about = "Print the cache root and where it came from")]
    Path(CacheArgs),
    #[command(about = "Report file counts and sizes per cache kind")]
    Info(CacheArgs),
    #[command(about = "Delete cached toolchains")]
    Prune(PruneArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Toolchain cache root (default: $PBGEN_CACHE_DIR, then the platform cache dir)"
    )]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    #[command(flatten)]
    pub cache: CacheArgs,
    #[arg(
        long,
        value_name = "KIND",
        help = "Kind to prune: protoc, protoc-gen-go or protoc-gen-go-grpc (repeatable, default all)"
    )]
    pub kind: Vec<CacheKind>,
    #[arg(long, help = "Report what would be removed without deleting")]
    pub dry_run: bool,
}

impl PruneArgs {
    #[must_use]
    pub fn kinds(&self) -> Vec<CacheKind> {
        if self.kind.is_empty() {
            CacheKind::all().collect()
        } else {
            self.kind.clone()
        }
    }
}
