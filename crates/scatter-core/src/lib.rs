pub mod catalog;
pub mod compare;
pub mod config;
pub mod dupes;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod generation;
pub mod platform;
pub mod progress;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod scanner;
pub mod snapshot;
pub mod storage;
pub mod usage;

pub use catalog::{Catalog, DryRun};
pub use compare::{diff_snapshots, diff_subtrees, TreeDiff};
pub use config::ScatterConfig;
pub use dupes::{DuplicateFinder, DuplicateSummary};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use generation::{Generation, GenerationRange, IncludeRule};
pub use progress::{ProgressReporter, SilentReporter};
pub use reconcile::{ReconcileOptions, ReconcileStats, Reconciler};
pub use record::{FileKind, Record};
pub use report::{report, Change, GenerationReport, ReportOptions};
pub use storage::{ChecksumKind, Finding, Store, StoreOptions};
pub use usage::{disk_usage, DiskUsage};
