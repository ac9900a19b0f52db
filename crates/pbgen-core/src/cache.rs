//! Inspection and pruning of the toolchain cache.
//!
//! ```text
//! <root>/protoc/...              distribution archives and extracted trees
//! <root>/protoc-gen-go/<ver>/    base plugin installs
//! <root>/protoc-gen-go-grpc/<ver>/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::debug;
use walkdir::WalkDir;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CacheKind {
    Protoc,
    ProtocGenGo,
    ProtocGenGoGrpc,
}

impl CacheKind {
    #[must_use]
    pub fn dir(self, root: &Path) -> PathBuf {
        root.join(self.as_ref())
    }

    pub fn all() -> impl Iterator<Item = CacheKind> {
        Self::iter()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KindUsage {
    pub kind: CacheKind,
    pub path: PathBuf,
    pub exists: bool,
    pub files: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneError {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    pub deleted_files: u64,
    pub deleted_bytes: u64,
    pub deleted_dirs: u64,
    pub errors: Vec<PruneError>,
}

/// File count and size for one cache kind.
///
/// # Errors
/// Returns an error if the directory tree cannot be traversed.
pub fn kind_usage(root: &Path, kind: CacheKind) -> Result<KindUsage> {
    let path = kind.dir(root);
    let mut usage = KindUsage {
        kind,
        path: path.clone(),
        exists: path.exists(),
        files: 0,
        bytes: 0,
    };
    if !usage.exists {
        return Ok(usage);
    }
    for entry in WalkDir::new(&path) {
        let entry = entry.with_context(|| format!("walking {}", path.display()))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("reading metadata of {}", entry.path().display()))?;
            usage.files += 1;
            usage.bytes += meta.len();
        }
    }
    Ok(usage)
}

/// # Errors
/// Returns an error if any kind's directory tree cannot be traversed.
pub fn usage(root: &Path) -> Result<Vec<KindUsage>> {
    CacheKind::all().map(|kind| kind_usage(root, kind)).collect()
}

/// Deletes every file and directory under the selected kinds.
///
/// Individual deletion failures are collected rather than aborting, so one locked file does not
/// keep the rest of the cache around.
///
/// # Errors
/// Returns an error only when a tree cannot be walked.
pub fn prune(root: &Path, kinds: &[CacheKind]) -> Result<PruneResult> {
    let mut result = PruneResult::default();
    for kind in kinds {
        let path = kind.dir(root);
        if !path.exists() {
            continue;
        }
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in WalkDir::new(&path).contents_first(true) {
            let entry = entry.with_context(|| format!("walking {}", path.display()))?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            } else {
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                files.push((entry.into_path(), size));
            }
        }
        for (file, size) in files {
            match fs::remove_file(&file) {
                Ok(()) => {
                    result.deleted_files += 1;
                    result.deleted_bytes += size;
                }
                Err(err) => result.errors.push(PruneError {
                    path: file,
                    error: err.to_string(),
                }),
            }
        }
        for dir in dirs {
            match fs::remove_dir(&dir) {
                Ok(()) => result.deleted_dirs += 1,
                Err(err) => result.errors.push(PruneError {
                    path: dir,
                    error: err.to_string(),
                }),
            }
        }
        debug!(%kind, path = %path.display(), "cache kind pruned");
    }
    Ok(result)
}
