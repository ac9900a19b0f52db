//! Schema search path from the gen-file package's imports.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use anyhow::{Error, Result};
use tracing::debug;

use crate::effects::GoTool;
use crate::error::PbgenError;

/// Build tag applied to every import lookup so generate-only imports resolve.
pub const GENERATE_TAG: &str = "generate";

/// Looks up the source directory of every non-empty import path, one thread per import.
///
/// The first failure wins: remaining lookups still run to completion but their results are
/// dropped. An import whose lookup reports a structured error is still accepted when the go
/// command also returned its directory. Output is sorted so callers get a stable order.
///
/// # Errors
/// Returns [`PbgenError::GraphResolution`] for imports without a source directory and
/// propagates process failures from the [`GoTool`].
pub fn resolve_search_paths(go: &dyn GoTool, imports: &[String]) -> Result<Vec<PathBuf>> {
    let dirs = Mutex::new(Vec::with_capacity(imports.len()));
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    thread::scope(|scope| {
        for import in imports.iter().filter(|import| !import.is_empty()) {
            let dirs = &dirs;
            let first_error = &first_error;
            scope.spawn(move || match lookup_dir(go, import) {
                Ok(dir) => {
                    if let Ok(mut dirs) = dirs.lock() {
                        dirs.push(dir);
                    }
                }
                Err(err) => {
                    if let Ok(mut slot) = first_error.lock() {
                        slot.get_or_insert(err);
                    }
                }
            });
        }
    });

    let first_error = first_error
        .into_inner()
        .map_err(|_| anyhow::anyhow!("import resolution state poisoned"))?;
    if let Some(err) = first_error {
        return Err(err);
    }
    let mut dirs = dirs
        .into_inner()
        .map_err(|_| anyhow::anyhow!("import resolution state poisoned"))?;
    dirs.sort();
    Ok(dirs)
}

fn lookup_dir(go: &dyn GoTool, import: &str) -> Result<PathBuf> {
    let pkg = go.list_package(import, &[GENERATE_TAG])?;
    match (pkg.source_dir(), pkg.error()) {
        (Some(dir), _) => {
            debug!(%import, dir = %dir.display(), "import resolved");
            Ok(dir.to_path_buf())
        }
        (None, Some(err)) => Err(PbgenError::graph(import, err).into()),
        (None, None) => Err(PbgenError::graph(import, "no source directory reported").into()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testing::{package, FakeGo};

    #[test]
    fn resolves_each_import_and_skips_empty_entries() -> Result<()> {
        let go = FakeGo::default()
            .with_package("pkgB", package("pkgB", Path::new("/y")))
            .with_package("pkgA", package("pkgA", Path::new("/x")));
        let imports = vec!["pkgA".to_string(), "pkgB".to_string(), String::new()];

        let dirs = resolve_search_paths(&go, &imports)?;
        assert_eq!(dirs, vec![PathBuf::from("/x"), PathBuf::from("/y")]);

        let tags = go.queried_tags.lock().expect("tags");
        assert_eq!(tags.len(), 2, "empty imports must not be queried");
        assert!(tags.iter().all(|tag| tag == GENERATE_TAG));
        Ok(())
    }

    #[test]
    fn empty_import_list_is_empty_path() -> Result<()> {
        let go = FakeGo::default();
        assert!(resolve_search_paths(&go, &[String::new()])?.is_empty());
        Ok(())
    }

    #[test]
    fn unresolvable_import_fails_whole_call() {
        let go = FakeGo::default().with_package("pkgA", package("pkgA", Path::new("/x")));
        let imports = vec!["pkgA".to_string(), "example.com/missing".to_string()];

        let err = resolve_search_paths(&go, &imports).expect_err("missing import");
        match err.downcast_ref::<PbgenError>() {
            Some(PbgenError::GraphResolution { target, reason }) => {
                assert_eq!(target, "example.com/missing");
                assert!(reason.contains("cannot find package"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_with_directory_is_tolerated() -> Result<()> {
        let mut partial = package("pkgA", Path::new("/x"));
        partial.error = Some(pbgen_domain::PackageError {
            err: Some("build constraints exclude all Go files".to_string()),
            ..pbgen_domain::PackageError::default()
        });
        let go = FakeGo::default().with_package("pkgA", partial);
        assert_eq!(
            resolve_search_paths(&go, &["pkgA".to_string()])?,
            vec![PathBuf::from("/x")]
        );
        Ok(())
    }

    #[test]
    fn missing_directory_without_error_fails() {
        let go = FakeGo::default().with_package(
            "pkgA",
            pbgen_domain::PackageDescriptor {
                import_path: Some("pkgA".to_string()),
                ..pbgen_domain::PackageDescriptor::default()
            },
        );
        let err = resolve_search_paths(&go, &["pkgA".to_string()]).expect_err("no dir");
        assert!(err.to_string().contains("no source directory"));
    }

    #[test]
    fn process_failure_propagates() {
        let go = FakeGo {
            failing_patterns: vec!["pkgA".to_string()],
            ..FakeGo::default()
        };
        let err = resolve_search_paths(&go, &["pkgA".to_string()]).expect_err("process failure");
        assert!(err.to_string().contains("exit status 1"));
    }
}
