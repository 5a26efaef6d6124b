use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::record::{absolute_path, FileKind, Record};
use crate::scanner::{list_directory, Exclusions};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Fingerprint regular files that are new or changed.
    pub checksums: bool,
    /// Descend below the root's direct children.
    pub recursive: bool,
    /// Path prefixes or glob patterns to leave untouched.
    pub excludes: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            checksums: true,
            recursive: true,
            excludes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub directories: usize,
    pub inserted: usize,
    pub retired: usize,
    pub unchanged: usize,
    pub recycled: usize,
    pub hashed_bytes: u64,
    pub errors: usize,
}

/// Brings the stored alive state of a tree in line with the filesystem.
///
/// Every directory is handled by one sort-merge join of its scanned entries
/// against its alive stored children; only the differences are written.
pub struct Reconciler<'a> {
    options: ReconcileOptions,
    exclusions: Exclusions,
    reporter: &'a dyn ProgressReporter,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Reconciler<'a> {
    pub fn new(options: ReconcileOptions) -> Self {
        let exclusions = Exclusions::new(&options.excludes);
        Self {
            options,
            exclusions,
            reporter: &SilentReporter,
            cancel: None,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Stop at the next entry once `flag` is set; staged work is committed
    /// and [`Error::Interrupted`] returned.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn reconcile<C: Catalog>(&self, catalog: &mut C, root: &Path) -> Result<ReconcileStats> {
        let start = Instant::now();
        let mut stats = ReconcileStats::default();
        self.reporter.on_reconcile_start(root);

        let root = absolute_path(root)?;
        let root_key = root.to_string_lossy().into_owned();
        info!("Reconciling {}", root_key);

        let stored = catalog.lookup(&root_key)?;
        let scanned = match Record::from_path(&root, false) {
            Ok(record) => Some(Scanned::new(root.clone(), record)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let descend = scanned.as_ref().is_some_and(|s| s.record.is_directory());
        self.merge_entry(catalog, stored, scanned, &mut stats)?;

        if descend {
            let mut queue = VecDeque::from([(root, root_key)]);
            while let Some((dir, key)) = queue.pop_front() {
                self.reconcile_directory(catalog, &dir, &key, &mut queue, &mut stats)?;
                if !self.options.recursive {
                    break;
                }
            }
        }

        catalog.commit()?;
        self.reporter.on_commit(&stats);

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Reconciled in {:.2}s: {} inserted, {} retired, {} unchanged, {} recycled, {} errors",
            elapsed, stats.inserted, stats.retired, stats.unchanged, stats.recycled, stats.errors
        );
        self.reporter.on_reconcile_complete(&stats, elapsed);
        Ok(stats)
    }

    /// Join the entries of `dir` against the alive children stored under
    /// `key`. Subdirectories still present are queued.
    fn reconcile_directory<C: Catalog>(
        &self,
        catalog: &mut C,
        dir: &Path,
        key: &str,
        queue: &mut VecDeque<(PathBuf, String)>,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        let listing = match list_directory(dir) {
            Ok(listing) => listing,
            Err(e) => {
                // Unreadable directories keep their stored children alive.
                warn!("{}", e);
                self.reporter.on_entry_error(dir, &e);
                stats.errors += 1;
                return Ok(());
            }
        };

        let mut scanned = Vec::with_capacity(listing.len());
        for entry in listing {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    self.report_error(dir, &e, stats);
                    continue;
                }
            };
            if self.exclusions.is_excluded(&path.to_string_lossy()) {
                debug!("Excluded {}", path.display());
                continue;
            }
            match Record::from_path(&path, false) {
                Ok(record) => scanned.push(Scanned::new(path, record)),
                Err(e) => self.report_error(&path, &e, stats),
            }
        }
        scanned.sort_by(|a, b| a.record.path.cmp(&b.record.path));
        // Distinct non-UTF-8 names can decode to the same key.
        scanned.dedup_by(|next, kept| {
            let clash = next.record.path == kept.record.path;
            if clash {
                warn!(
                    "Skipping {}: same stored path as {}",
                    next.source.display(),
                    kept.source.display()
                );
                stats.errors += 1;
            }
            clash
        });

        let mut stored = catalog.children(key)?;
        stored.retain(|r| !self.exclusions.is_excluded(&r.path));
        stored.sort_by(|a, b| a.path.cmp(&b.path));

        let mut scanned = scanned.into_iter().peekable();
        let mut stored = stored.into_iter().peekable();
        loop {
            self.check_cancel(catalog)?;

            let order = match (stored.peek(), scanned.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(old), Some(new)) => old.path.cmp(&new.record.path),
            };
            let (old, new) = match order {
                Ordering::Less => (stored.next(), None),
                Ordering::Greater => (None, scanned.next()),
                Ordering::Equal => (stored.next(), scanned.next()),
            };

            if let Some(new) = new.as_ref().filter(|s| s.record.is_directory()) {
                queue.push_back((new.source.clone(), new.record.path.clone()));
            }
            self.merge_entry(catalog, old, new, stats)?;
        }

        stats.directories += 1;
        self.reporter.on_directory(key, stats);
        Ok(())
    }

    /// Apply one row of the join: insert, retire, replace or leave alone.
    fn merge_entry<C: Catalog>(
        &self,
        catalog: &mut C,
        stored: Option<Record>,
        scanned: Option<Scanned>,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        match (stored, scanned) {
            (None, None) => {}
            (Some(old), None) => self.retire(catalog, &old, stats)?,
            (old, Some(mut new)) => {
                if let Err(e) = self.fingerprint(&mut new, old.as_ref(), stats) {
                    self.report_error(&new.source, &e, stats);
                    return Ok(());
                }
                let new = new.record;
                match old {
                    Some(old) if old.same_attributes(&new) => stats.unchanged += 1,
                    Some(old) => {
                        debug!("Changed {}", new.path);
                        if old.is_directory() && !new.is_directory() {
                            stats.retired += catalog.retire_recursive(&old)?;
                        } else {
                            stats.retired += catalog.retire(&old)?;
                        }
                        catalog.store(&new)?;
                        stats.inserted += 1;
                    }
                    None => {
                        debug!("New {}", new.path);
                        catalog.store(&new)?;
                        stats.inserted += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn retire<C: Catalog>(
        &self,
        catalog: &mut C,
        old: &Record,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        debug!("Gone {}", old.path);
        stats.retired += if old.is_directory() {
            catalog.retire_recursive(old)?
        } else {
            catalog.retire(old)?
        };
        Ok(())
    }

    /// Give a scanned regular file its fingerprint: recycled from the stored
    /// version when size and mtime are unchanged, read from disk otherwise.
    fn fingerprint(
        &self,
        scanned: &mut Scanned,
        stored: Option<&Record>,
        stats: &mut ReconcileStats,
    ) -> io::Result<()> {
        let record = &mut scanned.record;
        if record.kind != FileKind::File {
            return Ok(());
        }

        let recyclable = stored
            .filter(|old| old.kind == FileKind::File)
            .filter(|old| old.mtime == record.mtime && old.size == record.size)
            .and_then(|old| old.blob.as_ref())
            .filter(|blob| blob.is_complete());
        if let Some(blob) = recyclable {
            record.blob = Some(blob.clone());
            stats.recycled += 1;
            return Ok(());
        }

        if self.options.checksums {
            let blob = Fingerprint::from_file(&scanned.source)?;
            stats.hashed_bytes += blob.size;
            record.blob = Some(blob);
        }
        Ok(())
    }

    fn report_error(&self, path: &Path, error: &io::Error, stats: &mut ReconcileStats) {
        warn!("Skipping {}: {}", path.display(), error);
        self.reporter.on_entry_error(path, error);
        stats.errors += 1;
    }

    fn check_cancel<C: Catalog>(&self, catalog: &mut C) -> Result<()> {
        let cancelled = self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(AtomicOrdering::SeqCst));
        if cancelled {
            warn!("Interrupted, committing staged work");
            catalog.commit()?;
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

/// A scanned entry. `record.path` is the store key; `source` is the path it
/// was read from and stays exact for names that are not valid UTF-8.
struct Scanned {
    source: PathBuf,
    record: Record,
}

impl Scanned {
    fn new(source: PathBuf, record: Record) -> Self {
        Self { source, record }
    }
}
