use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Package metadata as reported by `go list -json -e`.
///
/// Every field is optional: the go command omits empty values, and a package that could not be
/// loaded may carry nothing but [`PackageDescriptor::error`]. Check the error before trusting
/// anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageDescriptor {
    pub dir: Option<PathBuf>,
    pub import_path: Option<String>,
    pub name: Option<String>,
    pub module: Option<ModuleDescriptor>,
    pub imports: Vec<String>,
    pub incomplete: bool,
    pub error: Option<PackageError>,
}

impl PackageDescriptor {
    /// Decodes a single package object.
    ///
    /// # Errors
    /// Returns the decoder error when the bytes are not a JSON package object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[must_use]
    pub fn error(&self) -> Option<&PackageError> {
        self.error.as_ref()
    }

    /// Source directory, treating an empty string the same as an absent one.
    #[must_use]
    pub fn source_dir(&self) -> Option<&Path> {
        self.dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    #[must_use]
    pub fn import_path(&self) -> &str {
        self.import_path.as_deref().unwrap_or_default()
    }

    /// Owning module, ignoring modules that the go command could not load.
    #[must_use]
    pub fn resolved_module(&self) -> Option<&ModuleDescriptor> {
        self.module.as_ref().filter(|module| module.error.is_none())
    }
}

/// A structured error attached to a package that could not be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageError {
    pub import_stack: Vec<String>,
    pub pos: Option<String>,
    pub err: Option<String>,
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.err.as_deref().unwrap_or("unknown package error");
        match self.pos.as_deref().filter(|pos| !pos.is_empty()) {
            Some(pos) => write!(f, "{pos}: {message}"),
            None => f.write_str(message),
        }
    }
}

/// Module metadata, either nested inside a package or returned by `go list -m -json -e`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModuleDescriptor {
    pub path: Option<String>,
    pub version: Option<String>,
    pub dir: Option<PathBuf>,
    pub main: bool,
    pub error: Option<ModuleError>,
}

impl ModuleDescriptor {
    /// Decodes a single module object.
    ///
    /// # Errors
    /// Returns the decoder error when the bytes are not a JSON module object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|version| !version.is_empty())
    }

    #[must_use]
    pub fn root_dir(&self) -> Option<&Path> {
        self.dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModuleError {
    pub err: String,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.err)
    }
}
