use crate::error::Result;
use crate::record::Record;
use crate::report::{describe_changes, FieldChange};
use crate::scanner::Exclusions;
use crate::storage::Store;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// One difference between two trees, keyed by `path`: the full path for
/// snapshots, the path relative to the compared roots for subtrees.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeDiff {
    Deleted {
        path: String,
        old: Record,
    },
    Modified {
        path: String,
        old: Record,
        new: Record,
        fields: Vec<FieldChange>,
    },
    Added {
        path: String,
        new: Record,
    },
}

impl TreeDiff {
    pub fn label(&self) -> &'static str {
        match self {
            TreeDiff::Deleted { .. } => "deleted",
            TreeDiff::Modified { .. } => "modified",
            TreeDiff::Added { .. } => "added",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TreeDiff::Deleted { path, .. }
            | TreeDiff::Modified { path, .. }
            | TreeDiff::Added { path, .. } => path,
        }
    }
}

impl fmt::Display for TreeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeDiff::Modified { path, fields, .. } if !fields.is_empty() => {
                let fields: Vec<String> = fields.iter().map(|c| c.to_string()).collect();
                write!(f, "modified {} ({})", path, fields.join(", "))
            }
            _ => write!(f, "{} {}", self.label(), self.path()),
        }
    }
}

/// Whether two versions hold the same file. Fingerprints decide when both
/// sides carry one; otherwise mtime and size stand in for the content.
/// Directories only differ by their entries, which are compared on their own.
pub fn same_file(old: &Record, new: &Record) -> bool {
    if old.kind != new.kind {
        return false;
    }
    if old.is_directory() {
        return true;
    }
    match (&old.blob, &new.blob) {
        (Some(a), Some(b)) => a.matches(b),
        _ => old.mtime == new.mtime && old.size == new.size && old.target == new.target,
    }
}

/// Full outer join of two path-keyed trees, in path order.
pub fn diff_trees(old: BTreeMap<String, Record>, new: BTreeMap<String, Record>) -> Vec<TreeDiff> {
    let mut diffs = Vec::new();
    let mut old = old.into_iter().peekable();
    let mut new = new.into_iter().peekable();

    loop {
        let order = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match order {
            Ordering::Less => {
                if let Some((path, old)) = old.next() {
                    diffs.push(TreeDiff::Deleted { path, old });
                }
            }
            Ordering::Greater => {
                if let Some((path, new)) = new.next() {
                    diffs.push(TreeDiff::Added { path, new });
                }
            }
            Ordering::Equal => {
                if let (Some((path, old)), Some((_, new))) = (old.next(), new.next()) {
                    if !same_file(&old, &new) {
                        let fields = describe_changes(&old, &new);
                        diffs.push(TreeDiff::Modified {
                            path,
                            old,
                            new,
                            fields,
                        });
                    }
                }
            }
        }
    }
    diffs
}

/// Compare two snapshots, optionally only the entries at or below `prefix`.
/// A path listed twice in one snapshot keeps its last line.
pub fn diff_snapshots<A, B>(old: A, new: B, prefix: Option<&str>) -> Result<Vec<TreeDiff>>
where
    A: IntoIterator<Item = Result<Record>>,
    B: IntoIterator<Item = Result<Record>>,
{
    let diffs = diff_trees(path_tree(old, prefix)?, path_tree(new, prefix)?);
    info!("Snapshot diff: {} differences", diffs.len());
    Ok(diffs)
}

fn path_tree<I>(records: I, prefix: Option<&str>) -> Result<BTreeMap<String, Record>>
where
    I: IntoIterator<Item = Result<Record>>,
{
    let mut tree = BTreeMap::new();
    for record in records {
        let record = record?;
        if prefix.map_or(true, |p| Path::new(&record.path).starts_with(p)) {
            tree.insert(record.path.clone(), record);
        }
    }
    Ok(tree)
}

/// Compare the alive subtrees stored under `old_root` and `new_root` by
/// their paths relative to each root. `excludes` are relative prefixes or
/// globs left out on both sides.
pub fn diff_subtrees(
    store: &Store,
    old_root: &str,
    new_root: &str,
    excludes: &[String],
) -> Result<Vec<TreeDiff>> {
    let exclusions = Exclusions::new(excludes);
    let old = relative_tree(store, old_root, &exclusions)?;
    let new = relative_tree(store, new_root, &exclusions)?;
    debug!(
        "Comparing {} ({} entries) with {} ({} entries)",
        old_root,
        old.len(),
        new_root,
        new.len()
    );
    Ok(diff_trees(old, new))
}

fn relative_tree(
    store: &Store,
    root: &str,
    exclusions: &Exclusions,
) -> Result<BTreeMap<String, Record>> {
    let root = Path::new(root);
    let mut tree = BTreeMap::new();
    for record in store.find_under(&root.to_string_lossy()) {
        let record = record?;
        let relative = match Path::new(&record.path).strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
            // The roots themselves are expected to differ.
            _ => continue,
        };
        if exclusions.is_excluded(&relative) {
            continue;
        }
        tree.insert(relative, record);
    }
    Ok(tree)
}
