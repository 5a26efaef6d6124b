mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{
    Cli, CompareArgs, Commands, DiffArgs, DuArgs, DupesArgs, ExportArgs, FsckArgs,
    GenerationsArgs, ImportArgs, LogArgs, QueryArgs, RemoveArgs, UpdateArgs,
};
use dotenv::dotenv;
use progress::CliReporter;
use scatter_core::config::{load_configuration, non_overlapping_directories};
use scatter_core::format::{format_time, human_bytes, Template};
use scatter_core::record::absolute_path;
use scatter_core::snapshot::{export_snapshot, open_snapshot};
use scatter_core::storage::case_insensitive_glob;
use scatter_core::{
    diff_snapshots, diff_subtrees, disk_usage, report, Change, ChecksumKind, DryRun,
    DuplicateFinder, GenerationRange, Reconciler, ReportOptions, ScatterConfig, Store, TreeDiff,
};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    let database = args
        .database
        .unwrap_or_else(|| PathBuf::from(&config.database));

    if let Err(err) = run(command, &config, &database) {
        error!("{:#}", err);
        eprintln!("{} {:#}", "error:".red(), err);
        process::exit(1);
    }
}

fn run(command: Commands, config: &ScatterConfig, database: &Path) -> Result<()> {
    match command {
        Commands::Update(args) => run_update(args, config, database),
        Commands::Log(args) => run_log(args, &open_store(config, database)?),
        Commands::Query(args) => run_query(args, &open_store(config, database)?),
        Commands::Dupes(args) => run_dupes(args, &open_store(config, database)?),
        Commands::Fsck(args) => run_fsck(args, &mut open_store(config, database)?),
        Commands::Remove(args) => run_remove(args, &mut open_store(config, database)?),
        Commands::Import(args) => run_import(args, &mut open_store(config, database)?),
        Commands::Export(args) => run_export(args, &open_store(config, database)?),
        Commands::Generations(args) => run_generations(args, &open_store(config, database)?),
        Commands::Diff(args) => run_diff(args),
        Commands::Compare(args) => run_compare(args, &open_store(config, database)?),
        Commands::Du(args) => run_du(args, &open_store(config, database)?),
        Commands::PrintConfig => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
    }
}

fn open_store(config: &ScatterConfig, database: &Path) -> Result<Store> {
    Store::open(database, config.store_options())
        .with_context(|| format!("opening store {}", database.display()))
}

fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

fn parse_range(store: &Store, text: &str) -> Result<GenerationRange> {
    let span = store.generation_span()?;
    Ok(GenerationRange::parse_within(text, &span)?)
}

fn fold_globs(globs: Vec<String>, ignore_case: bool) -> Vec<String> {
    if ignore_case {
        globs.iter().map(|g| case_insensitive_glob(g)).collect()
    } else {
        globs
    }
}

// ── update ───────────────────────────────────────────────────────

fn run_update(args: UpdateArgs, config: &ScatterConfig, database: &Path) -> Result<()> {
    let mut options = config.reconcile_options();
    options.excludes.extend(args.exclude);
    options.checksums = options.checksums && !args.no_checksums;
    options.recursive = !args.non_recursive;

    let roots: Vec<PathBuf> = args
        .paths
        .iter()
        .map(|p| absolute_path(p))
        .collect::<std::io::Result<_>>()?;
    let roots = non_overlapping_directories(roots);
    info!("Updating {:?}", roots);

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    let reporter = CliReporter::new();
    let reconciler = Reconciler::new(options)
        .with_reporter(&reporter)
        .with_cancel_flag(cancel);

    if args.dry_run {
        let store = if database.exists() {
            Some(open_store(config, database)?)
        } else {
            None
        };
        let mut catalog = DryRun::new(store.as_ref());
        for root in &roots {
            reconciler.reconcile(&mut catalog, root)?;
        }
        return Ok(());
    }

    let mut store = open_store(config, database)?;
    let generation = store.begin_generation(&command_line())?;
    for root in &roots {
        if let Err(err) = reconciler.reconcile(&mut store, root) {
            warn!("Generation {} left open", generation);
            return Err(err.into());
        }
    }
    store.end_generation(generation)?;
    Ok(())
}

// ── log ──────────────────────────────────────────────────────────

fn run_log(args: LogArgs, store: &Store) -> Result<()> {
    let range = parse_range(store, &args.range)?;
    let globs = fold_globs(args.globs, args.ignore_case);
    let options = ReportOptions {
        show_metadata_churn: args.show_churn,
    };

    for generation_report in report(store, &globs, &range, &options)? {
        let generation = &generation_report.generation;
        println!(
            "{} {}  {}",
            format!("generation {}", generation.id).bold(),
            generation.start_time.map(format_time).unwrap_or_default(),
            generation.command.dimmed()
        );
        for change in &generation_report.changes {
            let label = format!("{:>8}", change.label());
            let label = match change {
                Change::Deleted(_) => label.red(),
                Change::Changed { .. } => label.yellow(),
                Change::Renamed { .. } => label.cyan(),
                Change::Added(_) => label.green(),
            };
            match change {
                Change::Deleted(r) | Change::Added(r) => println!("{} {}", label, r.path),
                Change::Renamed { old, new } => {
                    println!("{} {} -> {}", label, old.path, new.path)
                }
                Change::Changed { new, fields, .. } => {
                    println!("{} {}", label, new.path);
                    for field in fields {
                        println!("         {}", field);
                    }
                }
            }
        }
        println!();
    }
    Ok(())
}

// ── query ────────────────────────────────────────────────────────

fn run_query(args: QueryArgs, store: &Store) -> Result<()> {
    let template = Template::parse(&args.format)?;
    let range = match &args.range {
        Some(text) => Some(parse_range(store, text)?),
        None => None,
    };

    let checksum = [
        (ChecksumKind::Md5, &args.md5),
        (ChecksumKind::Sha1, &args.sha1),
        (ChecksumKind::Crc32, &args.crc32),
    ]
    .into_iter()
    .find_map(|(kind, digest)| digest.as_ref().map(|d| (kind, d.clone())));

    let records = match checksum {
        Some(_) if !args.globs.is_empty() => {
            bail!("path globs and a checksum cannot be combined")
        }
        Some((kind, digest)) => store.find_by_checksum(kind, &digest, range.as_ref())?,
        None if args.globs.is_empty() => store.find_all(range.as_ref()),
        None => {
            let globs = fold_globs(args.globs, args.ignore_case);
            store.find_by_glob(&globs, range.as_ref())
        }
    };

    for record in records {
        println!("{}", template.render(&record?));
    }
    Ok(())
}

// ── dupes ────────────────────────────────────────────────────────

fn run_dupes(args: DupesArgs, store: &Store) -> Result<()> {
    let finder = DuplicateFinder::new(store);

    if args.summary {
        let summary = finder.summary(&args.prefix)?;
        println!(
            "{} groups, {} files, {} wasted",
            summary.groups,
            summary.files,
            human_bytes(summary.wasted_bytes).red()
        );
        return Ok(());
    }

    for group in finder.groups(&args.prefix) {
        let group = group?;
        let Some(first) = group.first() else {
            continue;
        };
        let blob = first.blob.as_ref();
        println!(
            "{} {}",
            blob.and_then(|b| b.sha1.as_deref()).unwrap_or("-").cyan(),
            human_bytes(blob.map_or(0, |b| b.size))
        );
        for record in &group {
            println!("    {}", record.path);
        }
    }
    Ok(())
}

// ── fsck ─────────────────────────────────────────────────────────

fn run_fsck(args: FsckArgs, store: &mut Store) -> Result<()> {
    let findings = store.integrity_check()?;
    for finding in &findings {
        println!("{} {}", "!".yellow(), finding);
    }
    if findings.is_empty() {
        println!("{} no problems found", "✓".green());
    }

    if args.fix_double_alive {
        let removed = store.cleanup_double_alive()?;
        println!("removed {} superseded records", removed);
    }
    if args.rebuild_directories {
        let linked = store.rebuild_directory_table()?;
        println!("directory table rebuilt for {} records", linked);
    }
    if args.rebuild_indices {
        store.rebuild_indices()?;
        println!("indices rebuilt");
    }
    if args.vacuum {
        store.vacuum()?;
        println!("store vacuumed");
    }
    Ok(())
}

// ── remove / import / export ─────────────────────────────────────

fn run_remove(args: RemoveArgs, store: &mut Store) -> Result<()> {
    let generation = store.begin_generation(&command_line())?;
    for path in &args.paths {
        let retired = store.remove_path(path, args.recursive)?;
        if retired == 0 {
            warn!("{}: no alive record", path);
        }
        println!("{} {} ({} records)", "removed".red(), path, retired);
    }
    store.commit()?;
    store.end_generation(generation)?;
    Ok(())
}

fn run_import(args: ImportArgs, store: &mut Store) -> Result<()> {
    let reader = open_snapshot(&args.file)
        .with_context(|| format!("opening snapshot {}", args.file.display()))?;
    let generation = store.begin_generation(&command_line())?;
    let count = store.import_snapshot(reader)?;
    store.end_generation(generation)?;
    eprintln!("imported {} records", count);
    Ok(())
}

fn run_export(args: ExportArgs, store: &Store) -> Result<()> {
    let range = match &args.range {
        Some(text) => Some(parse_range(store, text)?),
        None => None,
    };
    let count = export_snapshot(&args.file, store.find_all(range.as_ref()))?;
    eprintln!("exported {} records", count);
    Ok(())
}

// ── generations ──────────────────────────────────────────────────

fn run_generations(args: GenerationsArgs, store: &Store) -> Result<()> {
    let range = parse_range(store, &args.range)?;
    for generation in store.generations(&range)? {
        let end = match generation.end_time {
            Some(end) => format_time(end),
            None => "open".yellow().to_string(),
        };
        println!(
            "{:>6}  {}  {}  {}",
            generation.id,
            generation.start_time.map(format_time).unwrap_or_default(),
            end,
            generation.command
        );
    }
    Ok(())
}

// ── diff / compare / du ──────────────────────────────────────────

fn print_tree_diff(diff: &TreeDiff, verbose: bool) {
    let label = format!("{:>8}", diff.label());
    let label = match diff {
        TreeDiff::Deleted { .. } => label.red(),
        TreeDiff::Modified { .. } => label.yellow(),
        TreeDiff::Added { .. } => label.green(),
    };
    println!("{} {}", label, diff.path());
    if let TreeDiff::Modified { fields, .. } = diff {
        if verbose {
            for field in fields {
                println!("         {}", field);
            }
        }
    }
}

fn run_diff(args: DiffArgs) -> Result<()> {
    let old = open_snapshot(&args.old)
        .with_context(|| format!("opening snapshot {}", args.old.display()))?;
    let new = open_snapshot(&args.new)
        .with_context(|| format!("opening snapshot {}", args.new.display()))?;
    for diff in diff_snapshots(old, new, args.prefix.as_deref())? {
        print_tree_diff(&diff, args.verbose);
    }
    Ok(())
}

fn run_compare(args: CompareArgs, store: &Store) -> Result<()> {
    let old = absolute_path(&args.old)?;
    let new = absolute_path(&args.new)?;
    let diffs = diff_subtrees(
        store,
        &old.to_string_lossy(),
        &new.to_string_lossy(),
        &args.exclude,
    )?;
    for diff in &diffs {
        print_tree_diff(diff, false);
    }
    if diffs.is_empty() {
        println!("{} subtrees match", "✓".green());
    }
    Ok(())
}

fn run_du(args: DuArgs, store: &Store) -> Result<()> {
    for path in &args.paths {
        let path = absolute_path(path)?;
        let usage = disk_usage(store, &path.to_string_lossy())?;
        if !args.summarize {
            for (child, bytes) in &usage.children {
                println!("{:>10}  {}", human_bytes(*bytes), path.join(child).display());
            }
        }
        println!(
            "{:>10}  {} ({} files)",
            human_bytes(usage.bytes).bold(),
            usage.path,
            usage.files
        );
    }
    Ok(())
}
