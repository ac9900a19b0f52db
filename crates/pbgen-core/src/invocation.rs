//! Assembly and staging of the compiler argument file.

use std::env;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

use crate::fs::{absolutize, remove_dir_all_if_exists, write_file};

pub const SCHEMA_EXTENSION: &str = ".proto";
const STAGING_DIR: &str = ".pbgen";
const STAGING_FILE: &str = "protoc-args.txt";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DescriptorSetOptions {
    pub out: PathBuf,
    pub include_imports: bool,
    pub include_source_info: bool,
}

/// An installed code generator, named after its executable (`protoc-gen-go`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBinding {
    pub name: String,
    pub binary: PathBuf,
}

impl PluginBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, binary: PathBuf) -> Self {
        Self {
            name: name.into(),
            binary,
        }
    }

    /// Prefix of the plugin's `--<flag>_out` / `--<flag>_opt` directives.
    #[must_use]
    pub fn flag(&self) -> &str {
        self.name
            .strip_prefix("protoc-gen-")
            .unwrap_or(&self.name)
    }
}

/// Where generated code lands and which module path it is relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub module: String,
}

/// One compiler run, rendered line by line into the staged argument file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    /// Import directories, then the project schema dir, then the bundled includes.
    pub search_paths: Vec<PathBuf>,
    pub descriptor_set: Option<DescriptorSetOptions>,
    pub output: OutputTarget,
    /// Base plugin first; optional plugins follow only when installed.
    pub plugins: Vec<PluginBinding>,
    /// Extra directives, copied verbatim.
    pub extra_options: Vec<String>,
    pub schema_files: Vec<PathBuf>,
}

impl InvocationSpec {
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in &self.search_paths {
            let _ = writeln!(out, "--proto_path={}", path.display());
        }
        if let Some(descriptor) = &self.descriptor_set {
            let _ = writeln!(out, "--descriptor_set_out={}", descriptor.out.display());
            if descriptor.include_imports {
                out.push_str("--include_imports\n");
            }
            if descriptor.include_source_info {
                out.push_str("--include_source_info\n");
            }
        }
        for plugin in &self.plugins {
            let flag = plugin.flag();
            let _ = writeln!(out, "--{flag}_out={}", self.output.dir.display());
            let _ = writeln!(out, "--{flag}_opt=module={}", self.output.module);
            let _ = writeln!(
                out,
                "--plugin={}={}",
                plugin.name,
                plugin.binary.display()
            );
        }
        for option in &self.extra_options {
            let option = option.trim();
            if !option.is_empty() {
                let _ = writeln!(out, "{option}");
            }
        }
        for file in &self.schema_files {
            let _ = writeln!(out, "{}", file.display());
        }
        out
    }

    /// Truncates and rewrites `path` with the rendered arguments.
    ///
    /// # Errors
    /// Returns [`crate::PbgenError::Filesystem`] when the file or its parent cannot be written.
    pub fn stage(&self, path: &Path) -> Result<()> {
        write_file(path, self.render().as_bytes())?;
        info!(path = %path.display(), "argument file written");
        Ok(())
    }
}

/// Every `*.proto` file under `proto_dir`, as absolute paths in walk order.
///
/// Entries are visited sorted by file name so the staged file is byte-stable across runs.
///
/// # Errors
/// Any traversal error, including a missing `proto_dir`, aborts the walk.
pub fn discover_schema_files(proto_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(proto_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", proto_dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let is_schema = entry
            .file_name()
            .to_string_lossy()
            .ends_with(SCHEMA_EXTENSION);
        if is_schema {
            files.push(absolutize(entry.path())?);
        }
    }
    Ok(files)
}

/// Per-package argument file location under the system temp dir.
///
/// Runs of non-word characters in the import path collapse to `_`, so the same package always
/// reuses the same file.
#[must_use]
pub fn staging_file(import_path: &str) -> PathBuf {
    env::temp_dir()
        .join(STAGING_DIR)
        .join(sanitize(import_path))
        .join(STAGING_FILE)
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Recursively removes every configured output directory.
///
/// # Errors
/// The first removal failure aborts the run.
pub fn clean_dirs(dirs: &[PathBuf]) -> Result<()> {
    for dir in dirs {
        info!(dir = %dir.display(), "cleaning output directory");
        remove_dir_all_if_exists(dir)
            .with_context(|| format!("cleaning output directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn sample(plugins: Vec<PluginBinding>) -> InvocationSpec {
        InvocationSpec {
            search_paths: vec![
                PathBuf::from("/deps/shared"),
                PathBuf::from("/proj/api/proto"),
                PathBuf::from("/cache/protoc/key/include"),
            ],
            descriptor_set: None,
            output: OutputTarget {
                dir: PathBuf::from("/proj"),
                module: "example.com/proj".to_string(),
            },
            plugins,
            extra_options: Vec::new(),
            schema_files: vec![PathBuf::from("/proj/api/proto/a.proto")],
        }
    }

    fn base_plugin() -> PluginBinding {
        PluginBinding::new(
            "protoc-gen-go",
            PathBuf::from("/cache/protoc-gen-go/v1.34.2/protoc-gen-go"),
        )
    }

    #[test]
    fn renders_directives_in_compiler_order() {
        let mut spec = sample(vec![
            base_plugin(),
            PluginBinding::new(
                "protoc-gen-go-grpc",
                PathBuf::from("/cache/protoc-gen-go-grpc/1.4.0/protoc-gen-go-grpc"),
            ),
        ]);
        spec.descriptor_set = Some(DescriptorSetOptions {
            out: PathBuf::from("/proj/desc.pb"),
            include_imports: true,
            include_source_info: true,
        });
        spec.extra_options = vec!["--experimental_allow_proto3_optional".to_string()];

        let expected = "\
--proto_path=/deps/shared
--proto_path=/proj/api/proto
--proto_path=/cache/protoc/key/include
--descriptor_set_out=/proj/desc.pb
--include_imports
--include_source_info
--go_out=/proj
--go_opt=module=example.com/proj
--plugin=protoc-gen-go=/cache/protoc-gen-go/v1.34.2/protoc-gen-go
--go-grpc_out=/proj
--go-grpc_opt=module=example.com/proj
--plugin=protoc-gen-go-grpc=/cache/protoc-gen-go-grpc/1.4.0/protoc-gen-go-grpc
--experimental_allow_proto3_optional
/proj/api/proto/a.proto
";
        assert_eq!(spec.render(), expected);
    }

    #[test]
    fn absent_optional_plugin_emits_nothing() {
        let rendered = sample(vec![base_plugin()]).render();
        assert!(!rendered.contains("grpc"), "{rendered}");
        assert!(!rendered.contains("descriptor_set_out"));
    }

    #[test]
    fn duplicate_search_paths_are_kept() {
        let mut spec = sample(vec![base_plugin()]);
        spec.search_paths.push(PathBuf::from("/deps/shared"));
        assert_eq!(spec.render().matches("--proto_path=/deps/shared\n").count(), 2);
    }

    #[test]
    fn staging_twice_is_byte_identical() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join(STAGING_FILE);
        let spec = sample(vec![base_plugin()]);
        spec.stage(&path)?;
        let first = fs::read(&path)?;
        spec.stage(&path)?;
        assert_eq!(fs::read(&path)?, first);

        let shorter = InvocationSpec {
            schema_files: Vec::new(),
            ..spec
        };
        shorter.stage(&path)?;
        assert_eq!(fs::read_to_string(&path)?, shorter.render());
        Ok(())
    }

    #[test]
    fn discovers_schema_files_recursively() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("proto");
        fs::create_dir_all(root.join("v1/inner"))?;
        fs::create_dir_all(root.join("dir.proto"))?;
        fs::write(root.join("b.proto"), "")?;
        fs::write(root.join("a.proto"), "")?;
        fs::write(root.join("v1/inner/c.proto"), "")?;
        fs::write(root.join("README.md"), "")?;
        fs::write(root.join("v1/notes.proto.bak"), "")?;

        let files = discover_schema_files(&root)?;
        let root = absolutize(&root)?;
        assert_eq!(
            files,
            vec![
                root.join("a.proto"),
                root.join("b.proto"),
                root.join("v1/inner/c.proto"),
            ]
        );
        assert!(files.iter().all(|file| file.is_absolute()));
        assert_eq!(discover_schema_files(&root)?, files);
        Ok(())
    }

    #[test]
    fn missing_schema_dir_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = discover_schema_files(&temp.path().join("absent")).expect_err("missing dir");
        assert!(format!("{err:#}").contains("walking"));
    }

    #[test]
    fn staging_file_is_stable_per_package() {
        let first = staging_file("example.com/proj/api-v2");
        assert_eq!(first, staging_file("example.com/proj/api-v2"));
        assert!(first.ends_with(Path::new(".pbgen/example_com_proj_api_v2/protoc-args.txt")));
        assert_ne!(first, staging_file("example.com/proj/other"));
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize("a//b..c"), "a_b_c");
        assert_eq!(sanitize("snake_case"), "snake_case");
    }

    #[test]
    fn plugin_flag_strips_prefix() {
        assert_eq!(base_plugin().flag(), "go");
        assert_eq!(PluginBinding::new("custom", PathBuf::new()).flag(), "custom");
    }

    #[test]
    fn clean_removes_relative_and_absolute_entries() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let project = temp.path().join("proj");
        let other = temp.path().join("abs").join("other");
        fs::create_dir_all(project.join("gen/nested"))?;
        fs::write(project.join("gen/nested/old.pb.go"), "stale")?;
        fs::create_dir_all(&other)?;
        fs::write(project.join("keep.go"), "")?;

        let config = crate::config::GeneratorConfig {
            clean_dir: format!("gen, {}", other.display()),
            ..crate::config::GeneratorConfig::default()
        };
        clean_dirs(&config.clean_dirs_in(&project))?;

        assert!(!project.join("gen").exists());
        assert!(!other.exists());
        let remaining: Vec<_> = fs::read_dir(&project)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        assert_eq!(remaining, vec![std::ffi::OsString::from("keep.go")]);

        clean_dirs(&config.clean_dirs_in(&project))?;
        Ok(())
    }
}
