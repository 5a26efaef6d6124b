use crate::reconcile::ReconcileStats;
use std::path::Path;

/// Trait for reporting reconciliation progress and per-entry problems.
///
/// The CLI implements it with indicatif and tracing. All methods have
/// default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_reconcile_start(&self, _root: &Path) {}
    fn on_directory(&self, _path: &str, _stats: &ReconcileStats) {}
    /// An entry that could not be read; it has been skipped.
    fn on_entry_error(&self, _path: &Path, _error: &std::io::Error) {}
    fn on_commit(&self, _stats: &ReconcileStats) {}
    fn on_reconcile_complete(&self, _stats: &ReconcileStats, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
