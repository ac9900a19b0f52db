use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

fn crate_file(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn source_without_tests(path: &Path) -> String {
    let contents = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("reading {}: {err}", path.display()));
    match contents.find("#[cfg(test)]") {
        Some(index) => contents[..index].to_string(),
        None => contents,
    }
}

fn dir_sources(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.unwrap_or_else(|err| panic!("walking {}: {err}", dir.display())))
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "rs"))
        .collect()
}

#[test]
fn extractor_does_no_network_or_process_work() {
    let source = source_without_tests(&crate_file("src/archive.rs"));
    for needle in ["reqwest", "std::process", "crate::process", "Command"] {
        assert!(
            !source.contains(needle),
            "archive extraction must stay filesystem-only, found {needle}"
        );
    }
}

#[test]
fn invocation_builder_never_spawns() {
    let source = source_without_tests(&crate_file("src/invocation.rs"));
    assert!(!source.contains("Command"), "invocation builder must not spawn processes");
    assert!(!source.contains("reqwest"), "invocation builder must not touch the network");
}

#[test]
fn only_the_distribution_cache_talks_http() {
    for path in dir_sources(&crate_file("src")) {
        if path.ends_with("distribution.rs") {
            continue;
        }
        let source = source_without_tests(&path);
        assert!(
            !source.contains("reqwest"),
            "unexpected http client use in {}",
            path.display()
        );
    }
}

#[test]
fn domain_crate_does_no_io() {
    let domain = crate_file("../pbgen-domain/src");
    let sources = dir_sources(&domain);
    assert!(!sources.is_empty(), "domain sources not found at {}", domain.display());
    for path in sources {
        let source = source_without_tests(&path);
        for needle in ["std::fs", "std::process", "std::net", "reqwest", "std::env"] {
            assert!(
                !source.contains(needle),
                "{} must stay pure but uses {needle}",
                path.display()
            );
        }
    }
}
