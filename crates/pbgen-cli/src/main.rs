use clap::Parser;
use color_eyre::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pbgen_core::{cache, resolve_cache_root, Generator};

mod cli;
mod output;

use cli::{CacheCommand, PbgenCli, PbgenCommand, PruneArgs};
use output::{OutputOptions, Report};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PbgenCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
    };
    let command = cli.resolved_command();
    debug!(?command, "dispatching");
    let code = match dispatch(command) {
        Ok(report) => output::emit_report(&opts, &report)?,
        Err(err) => output::emit_error(&opts, &err)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("pbgen={level},pbgen_core={level},pbgen_cli={level}"))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn dispatch(command: PbgenCommand) -> anyhow::Result<Report> {
    match command {
        PbgenCommand::Generate(args) => {
            let summary = Generator::new(args.to_config())?.run()?;
            Ok(Report::Generate(summary))
        }
        PbgenCommand::Cache(CacheCommand::Path(args)) => {
            let location = resolve_cache_root(args.cache_dir.as_deref())?;
            Ok(Report::CachePath(location))
        }
        PbgenCommand::Cache(CacheCommand::Info(args)) => {
            let root = resolve_cache_root(args.cache_dir.as_deref())?.path;
            let kinds = cache::usage(&root)?;
            Ok(Report::CacheInfo { root, kinds })
        }
        PbgenCommand::Cache(CacheCommand::Prune(args)) => prune(&args),
    }
}

fn prune(args: &PruneArgs) -> anyhow::Result<Report> {
    let root = resolve_cache_root(args.cache.cache_dir.as_deref())?.path;
    let kinds = args.kinds();
    let planned = kinds
        .iter()
        .map(|kind| cache::kind_usage(&root, *kind))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let result = if args.dry_run {
        None
    } else {
        Some(cache::prune(&root, &kinds)?)
    };
    Ok(Report::CachePrune {
        root,
        kinds,
        dry_run: args.dry_run,
        planned,
        result,
    })
}
