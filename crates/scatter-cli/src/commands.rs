use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "scatter")]
#[command(about = "Track filesystem metadata across generations", long_about = None)]
pub struct Cli {
    /// Store file, overrides the configured one
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Configuration file instead of ./scatter.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories and record what changed in a new generation
    Update(UpdateArgs),
    /// Show per-generation changes
    Log(LogArgs),
    /// Look up stored records
    Query(QueryArgs),
    /// List groups of files with identical content
    Dupes(DupesArgs),
    /// Check store integrity and run maintenance
    Fsck(FsckArgs),
    /// Mark a stored path as gone without scanning
    Remove(RemoveArgs),
    /// Load records from a snapshot file
    Import(ImportArgs),
    /// Write records to a snapshot file
    Export(ExportArgs),
    /// List generations
    Generations(GenerationsArgs),
    /// Compare two snapshot files
    Diff(DiffArgs),
    /// Compare two subtrees stored in the store
    Compare(CompareArgs),
    /// Show stored disk usage below paths
    Du(DuArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Log what would change without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip content fingerprints for new or changed files
    #[arg(long)]
    pub no_checksums: bool,

    /// Only look at the direct children of each path
    #[arg(long)]
    pub non_recursive: bool,

    /// Path prefix or glob to leave out, in addition to the configured ones
    #[arg(short, long)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Path globs to restrict the report to
    pub globs: Vec<String>,

    /// Generation range, e.g. `5`, `3:7`, `-2:`
    #[arg(short, long, default_value = "", allow_hyphen_values = true)]
    pub range: String,

    #[arg(short, long)]
    pub ignore_case: bool,

    /// Also list changes that left the content untouched
    #[arg(long)]
    pub show_churn: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Path globs; all alive records when empty
    pub globs: Vec<String>,

    /// Generation range instead of alive records only
    #[arg(short, long, allow_hyphen_values = true)]
    pub range: Option<String>,

    #[arg(long, conflicts_with_all = ["sha1", "crc32"])]
    pub md5: Option<String>,

    #[arg(long, conflicts_with = "crc32")]
    pub sha1: Option<String>,

    #[arg(long)]
    pub crc32: Option<String>,

    /// Output template, e.g. "{sha1} {size} {path}"
    #[arg(short, long, default_value = "{path}")]
    pub format: String,

    #[arg(short, long)]
    pub ignore_case: bool,
}

#[derive(Debug, Args)]
pub struct DupesArgs {
    #[arg(default_value = "/")]
    pub prefix: String,

    /// Print totals only
    #[arg(short, long)]
    pub summary: bool,
}

#[derive(Debug, Args)]
pub struct FsckArgs {
    /// Delete all but the newest alive record of each path
    #[arg(long)]
    pub fix_double_alive: bool,

    #[arg(long)]
    pub rebuild_directories: bool,

    #[arg(long)]
    pub rebuild_indices: bool,

    #[arg(long)]
    pub vacuum: bool,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    pub paths: Vec<String>,

    /// Required to remove a directory and everything below it
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Snapshot file, `-` for stdin, `.gz` is decompressed
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Snapshot file, `-` for stdout, `.gz` is compressed
    #[arg(default_value = "-")]
    pub file: PathBuf,

    /// Generation range instead of alive records only
    #[arg(short, long, allow_hyphen_values = true)]
    pub range: Option<String>,
}

#[derive(Debug, Args)]
pub struct GenerationsArgs {
    #[arg(default_value = "", allow_hyphen_values = true)]
    pub range: String,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Older snapshot, `-` for stdin
    pub old: PathBuf,

    /// Newer snapshot
    pub new: PathBuf,

    /// Only compare entries at or below this path
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Also list the attributes that differ
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    pub old: PathBuf,

    pub new: PathBuf,

    /// Relative subpath or glob to leave out
    #[arg(short, long)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DuArgs {
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Print totals only
    #[arg(short, long)]
    pub summarize: bool,
}
