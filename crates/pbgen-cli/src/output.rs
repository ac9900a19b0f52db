use std::path::PathBuf;

use color_eyre::Result;
use pbgen_core::cache::{CacheKind, KindUsage, PruneResult};
use pbgen_core::{CacheLocation, GenerateSummary, PbgenError};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
}

/// Result of one dispatched command, ready to print.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Report {
    Generate(GenerateSummary),
    CachePath(CacheLocation),
    CacheInfo {
        root: PathBuf,
        kinds: Vec<KindUsage>,
    },
    CachePrune {
        root: PathBuf,
        kinds: Vec<CacheKind>,
        dry_run: bool,
        planned: Vec<KindUsage>,
        result: Option<PruneResult>,
    },
}

/// Prints a successful report and returns the exit code.
pub fn emit_report(opts: &OutputOptions, report: &Report) -> Result<i32> {
    if opts.json {
        let payload = json!({ "status": "ok", "details": report });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(0);
    }
    let failed_prunes = match report {
        Report::CachePrune {
            result: Some(result),
            ..
        } => !result.errors.is_empty(),
        _ => false,
    };
    if opts.quiet && !failed_prunes {
        return Ok(0);
    }
    for line in render_human(report) {
        println!("{line}");
    }
    Ok(i32::from(failed_prunes))
}

/// Prints a failure, including the error class and hint when the chain carries one.
pub fn emit_error(opts: &OutputOptions, err: &anyhow::Error) -> Result<i32> {
    let classified = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<PbgenError>());
    if opts.json {
        let payload = error_payload(err, classified);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        eprintln!("pbgen: {err:#}");
        if let Some(hint) = classified.and_then(PbgenError::hint) {
            eprintln!("Tip: {hint}");
        }
    }
    Ok(1)
}

fn error_payload(err: &anyhow::Error, classified: Option<&PbgenError>) -> Value {
    json!({
        "status": "error",
        "message": format!("{err:#}"),
        "class": classified.map(PbgenError::class),
        "hint": classified.and_then(PbgenError::hint),
    })
}

fn render_human(report: &Report) -> Vec<String> {
    match report {
        Report::Generate(summary) => {
            let mut lines = vec![format!(
                "pbgen generate: compiled {} schema file(s) for {}",
                summary.schema_files, summary.package
            )];
            lines.push(format!("  module    {}", summary.module));
            lines.push(format!("  protoc    {}", summary.compiler.display()));
            for plugin in &summary.plugins {
                lines.push(format!("  plugin    {}", plugin.display()));
            }
            lines.push(format!("  args file {}", summary.args_file.display()));
            lines
        }
        Report::CachePath(location) => {
            vec![format!("{} ({})", location.path.display(), location.source)]
        }
        Report::CacheInfo { root, kinds } => {
            let mut lines = vec![format!("cache root {}", root.display())];
            lines.extend(kinds.iter().map(usage_line));
            lines
        }
        Report::CachePrune {
            dry_run: true,
            planned,
            ..
        } => {
            let mut lines = vec!["pbgen cache prune: dry run, nothing removed".to_string()];
            lines.extend(planned.iter().filter(|usage| usage.exists).map(usage_line));
            lines
        }
        Report::CachePrune { result, .. } => {
            let Some(result) = result else {
                return Vec::new();
            };
            let mut lines = vec![format!(
                "pbgen cache prune: removed {} file(s), {} dir(s), {}",
                result.deleted_files,
                result.deleted_dirs,
                format_bytes(result.deleted_bytes)
            )];
            for failure in &result.errors {
                lines.push(format!("  failed {}: {}", failure.path.display(), failure.error));
            }
            lines
        }
    }
}

fn usage_line(usage: &KindUsage) -> String {
    if !usage.exists {
        return format!("  {:<20} empty", usage.kind.as_ref());
    }
    format!(
        "  {:<20} {:>6} file(s) {:>10}",
        usage.kind.as_ref(),
        usage.files,
        format_bytes(usage.bytes)
    )
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut unit = 0;
    let mut whole = bytes;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        whole /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        #[allow(clippy::cast_precision_loss)]
        let value = bytes as f64 / f64::from(1u32 << (10 * unit));
        format!("{value:.1} {}", UNITS[unit])
    }
}
