//! Zip extraction with path containment.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use zip::ZipArchive;

use crate::error::{ArchiveIssue, PbgenError};
use crate::fs::{absolutize, create_dir_all};

/// Writes every entry of `reader` under `dest`, preserving unix file modes.
///
/// Each entry must resolve lexically inside `dest`; the first entry that would escape fails the
/// whole extraction with [`ArchiveIssue::PathTraversal`]. Files written before that entry are
/// left in place. Returns the number of files written.
///
/// # Errors
/// Returns [`PbgenError::ArchiveIntegrity`] for malformed or malicious archives and
/// [`PbgenError::Filesystem`] when the destination cannot be written.
pub fn extract_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<usize> {
    let root = clean(&absolutize(dest)?);
    let mut archive = ZipArchive::new(reader).map_err(|err| malformed(&root, err))?;
    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| malformed(&root, err))?;
        let name = entry.name().to_string();
        let Some(target) = contained_path(&root, &name) else {
            return Err(PbgenError::ArchiveIntegrity {
                path: root,
                issue: ArchiveIssue::PathTraversal { entry: name },
            }
            .into());
        };

        if entry.is_dir() {
            create_dir_all(&target)?;
            continue;
        }
        if target == root {
            return Err(PbgenError::ArchiveIntegrity {
                path: root,
                issue: ArchiveIssue::PathTraversal { entry: name },
            }
            .into());
        }
        if let Some(parent) = target.parent() {
            create_dir_all(parent)?;
        }

        let mut out = File::create(&target)
            .map_err(|err| PbgenError::filesystem("create file", &target, err))?;
        io::copy(&mut entry, &mut out).map_err(|err| match err.kind() {
            io::ErrorKind::InvalidData => malformed(&root, err),
            _ => PbgenError::filesystem("write file", &target, err),
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|err| PbgenError::filesystem("set permissions", &target, err))?;
            }
        }
        written += 1;
    }
    Ok(written)
}

fn malformed(root: &Path, err: impl ToString) -> PbgenError {
    PbgenError::ArchiveIntegrity {
        path: root.to_path_buf(),
        issue: ArchiveIssue::Malformed {
            reason: err.to_string(),
        },
    }
}

/// Joins `entry` onto `root` and returns it only if the cleaned result stays within `root`.
fn contained_path(root: &Path, entry: &str) -> Option<PathBuf> {
    let joined = clean(&root.join(entry));
    joined.starts_with(root).then_some(joined)
}

/// Lexical path cleaning: drops `.` and folds `..` without touching the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    fn zip_bytes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents, mode) in entries {
            let options = FileOptions::default().unix_permissions(*mode);
            writer.start_file(*name, options).expect("start entry");
            writer.write_all(contents).expect("write entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn extracts_nested_entry_with_contents() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let dest = temp.path().join("dist");
        let bytes = zip_bytes(&[("a/b/c.txt", b"hello", 0o640)]);

        let written = extract_zip(Cursor::new(bytes), &dest)?;
        assert_eq!(written, 1);
        assert_eq!(fs::read_to_string(dest.join("a/b/c.txt"))?, "hello");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("a/b/c.txt"))?.permissions().mode();
            assert_eq!(mode & 0o777, 0o640);
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_preserved() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::tempdir()?;
        let bytes = zip_bytes(&[("bin/protoc", b"#!/bin/sh\n", 0o755)]);
        extract_zip(Cursor::new(bytes), temp.path())?;
        let mode = fs::metadata(temp.path().join("bin/protoc"))?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        Ok(())
    }

    #[test]
    fn traversal_entry_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let dest = temp.path().join("inner").join("dist");
        let bytes = zip_bytes(&[("../../evil", b"pwned", 0o644)]);

        let err = extract_zip(Cursor::new(bytes), &dest).expect_err("must reject traversal");
        match err.downcast_ref::<PbgenError>() {
            Some(PbgenError::ArchiveIntegrity {
                issue: ArchiveIssue::PathTraversal { entry },
                ..
            }) => assert_eq!(entry, "../../evil"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!temp.path().join("evil").exists());
        assert!(!temp.path().join("inner").join("evil").exists());
        Ok(())
    }

    #[test]
    fn absolute_entry_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let outside = temp.path().join("outside.txt");
        let name = outside.to_string_lossy().to_string();
        let bytes = zip_bytes(&[(name.as_str(), b"x", 0o644)]);

        let err = extract_zip(Cursor::new(bytes), &temp.path().join("dist"))
            .expect_err("absolute entry escapes");
        assert!(err.to_string().contains("escapes the destination"));
        assert!(!outside.exists());
        Ok(())
    }

    #[test]
    fn dotdot_that_stays_inside_is_allowed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let bytes = zip_bytes(&[("include/../bin/protoc", b"bin", 0o755)]);
        extract_zip(Cursor::new(bytes), temp.path())?;
        assert!(temp.path().join("bin/protoc").exists());
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = extract_zip(Cursor::new(b"<html>not found</html>".to_vec()), temp.path())
            .expect_err("not a zip");
        assert!(matches!(
            err.downcast_ref::<PbgenError>(),
            Some(PbgenError::ArchiveIntegrity {
                issue: ArchiveIssue::Malformed { .. },
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn contained_path_is_lexical() {
        let root = Path::new("/cache/protoc/key");
        assert_eq!(
            contained_path(root, "include/google/protobuf/any.proto"),
            Some(PathBuf::from("/cache/protoc/key/include/google/protobuf/any.proto"))
        );
        assert_eq!(contained_path(root, "../key2/bin"), None);
        assert_eq!(contained_path(root, "./bin/./protoc"), Some(root.join("bin/protoc")));
    }
}
