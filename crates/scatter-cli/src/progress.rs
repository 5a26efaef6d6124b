use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use scatter_core::{ProgressReporter, ReconcileStats};
use std::path::Path;
use std::time::Duration;

/// Spinner showing the directory being reconciled and running totals.
pub struct CliReporter {
    bar: ProgressBar,
}

impl CliReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        Self { bar }
    }
}

impl ProgressReporter for CliReporter {
    fn on_reconcile_start(&self, root: &Path) {
        self.bar.set_message(format!("Reconciling {}...", root.display()));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_directory(&self, path: &str, stats: &ReconcileStats) {
        self.bar.set_message(format!(
            "{} dirs, +{} -{} | {}",
            stats.directories, stats.inserted, stats.retired, path
        ));
    }

    fn on_entry_error(&self, path: &Path, error: &std::io::Error) {
        self.bar.println(format!(
            "  {} {}: {}",
            "!".yellow(),
            path.display(),
            error
        ));
    }

    fn on_reconcile_complete(&self, stats: &ReconcileStats, duration_secs: f64) {
        self.bar.finish_and_clear();
        eprintln!(
            "  {} {} directories in {:.2}s: {} inserted, {} retired, {} unchanged, {} recycled",
            "✓".green(),
            stats.directories,
            duration_secs,
            stats.inserted.to_string().green(),
            stats.retired.to_string().red(),
            stats.unchanged,
            stats.recycled,
        );
        if stats.errors > 0 {
            eprintln!("  {} {} entries skipped", "!".yellow(), stats.errors);
        }
    }
}
