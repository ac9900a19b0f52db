//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use pbgen_domain::{ModuleDescriptor, PackageDescriptor, PackageError};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::distribution::MIN_ARCHIVE_BYTES;
use crate::effects::GoTool;

/// A release-shaped archive padded past [`MIN_ARCHIVE_BYTES`].
pub(crate) fn release_zip(compiler_script: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let exec = FileOptions::default().unix_permissions(0o755);
    writer.start_file("bin/protoc", exec).expect("entry");
    writer
        .write_all(compiler_script.as_bytes())
        .expect("write");
    let plain = FileOptions::default().unix_permissions(0o644);
    writer
        .start_file("include/google/protobuf/empty.proto", plain)
        .expect("entry");
    writer
        .write_all(b"syntax = \"proto3\";\npackage google.protobuf;\nmessage Empty {}\n")
        .expect("write");
    let stored = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);
    writer.start_file("readme.txt", stored).expect("entry");
    writer
        .write_all(&vec![b'.'; MIN_ARCHIVE_BYTES as usize])
        .expect("write");
    writer.finish().expect("finish").into_inner()
}

pub(crate) fn package(import_path: &str, dir: &Path) -> PackageDescriptor {
    PackageDescriptor {
        dir: Some(dir.to_path_buf()),
        import_path: Some(import_path.to_string()),
        ..PackageDescriptor::default()
    }
}

pub(crate) fn module(path: &str, version: Option<&str>, dir: &Path) -> ModuleDescriptor {
    ModuleDescriptor {
        path: Some(path.to_string()),
        version: version.map(str::to_string),
        dir: Some(dir.to_path_buf()),
        ..ModuleDescriptor::default()
    }
}

/// Scripted go toolchain: answers from tables and records every install.
#[derive(Default)]
pub(crate) struct FakeGo {
    pub packages: HashMap<String, PackageDescriptor>,
    pub modules: HashMap<String, ModuleDescriptor>,
    pub failing_patterns: Vec<String>,
    pub exe_suffix: String,
    pub installs: Mutex<Vec<(String, PathBuf)>>,
    pub queried_tags: Mutex<Vec<String>>,
}

impl FakeGo {
    pub(crate) fn with_package(mut self, pattern: &str, pkg: PackageDescriptor) -> Self {
        self.packages.insert(pattern.to_string(), pkg);
        self
    }

    pub(crate) fn with_module(mut self, path: &str, module: ModuleDescriptor) -> Self {
        self.modules.insert(path.to_string(), module);
        self
    }

    pub(crate) fn installs(&self) -> Vec<(String, PathBuf)> {
        self.installs.lock().expect("installs lock").clone()
    }
}

impl GoTool for FakeGo {
    fn list_package(&self, pattern: &str, tags: &[&str]) -> Result<PackageDescriptor> {
        self.queried_tags
            .lock()
            .expect("tags lock")
            .push(tags.join(","));
        if self.failing_patterns.iter().any(|p| p == pattern) {
            bail!("go list {pattern}: exit status 1");
        }
        Ok(self
            .packages
            .get(pattern)
            .cloned()
            .unwrap_or_else(|| PackageDescriptor {
                import_path: Some(pattern.to_string()),
                error: Some(PackageError {
                    err: Some(format!("cannot find package {pattern}")),
                    ..PackageError::default()
                }),
                ..PackageDescriptor::default()
            }))
    }

    fn list_module(&self, module: &str) -> Result<ModuleDescriptor> {
        Ok(self
            .modules
            .get(module)
            .cloned()
            .unwrap_or_else(|| ModuleDescriptor {
                path: Some(module.to_string()),
                error: Some(pbgen_domain::ModuleError {
                    err: format!("module {module} not in build list"),
                }),
                ..ModuleDescriptor::default()
            }))
    }

    fn install(&self, spec: &str, bin_dir: &Path) -> Result<()> {
        self.installs
            .lock()
            .expect("installs lock")
            .push((spec.to_string(), bin_dir.to_path_buf()));
        let name = spec
            .split('@')
            .next()
            .and_then(|pkg| pkg.rsplit('/').next())
            .unwrap_or(spec);
        fs::create_dir_all(bin_dir)?;
        fs::write(bin_dir.join(format!("{name}{}", self.exe_suffix)), "#!/bin/sh\n")?;
        Ok(())
    }

    fn exe_suffix(&self) -> Result<String> {
        Ok(self.exe_suffix.clone())
    }
}
