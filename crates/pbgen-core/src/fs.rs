use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::PbgenError;

/// Removes `path` recursively; a missing path is not an error.
///
/// Symlinks are unlinked rather than followed.
pub(crate) fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(PbgenError::filesystem("stat", path, err).into()),
    };
    if meta.file_type().is_symlink() || meta.is_file() {
        fs::remove_file(path).map_err(|err| PbgenError::filesystem("remove file", path, err))?;
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PbgenError::filesystem("remove directory", path, err).into()),
    }
}

pub(crate) fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|err| PbgenError::filesystem("create directory", path, err))?;
    Ok(())
}

/// Truncates and rewrites `path`, creating its parent first.
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    fs::write(path, contents).map_err(|err| PbgenError::filesystem("write file", path, err))?;
    Ok(())
}

pub(crate) fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|err| PbgenError::filesystem("resolve absolute path", path, err).into())
}
