use crate::error::Result;
use crate::format::{format_time, human_bytes};
use crate::generation::{Generation, GenerationRange};
use crate::record::Record;
use crate::storage::Store;
use ahash::AHashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Keep changed pairs whose content is identical.
    pub show_metadata_churn: bool,
}

/// One attribute that differs between two versions of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub description: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(self.field)
        } else {
            write!(f, "{}: {}", self.field, self.description)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Deleted(Record),
    Changed {
        old: Record,
        new: Record,
        fields: Vec<FieldChange>,
    },
    Renamed {
        old: Record,
        new: Record,
    },
    Added(Record),
}

impl Change {
    pub fn label(&self) -> &'static str {
        match self {
            Change::Deleted(_) => "deleted",
            Change::Changed { .. } => "changed",
            Change::Renamed { .. } => "renamed",
            Change::Added(_) => "added",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Change::Deleted(r) | Change::Added(r) => &r.path,
            Change::Changed { new, .. } => &new.path,
            Change::Renamed { old, .. } => &old.path,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Change::Deleted(_) => 0,
            Change::Changed { .. } => 1,
            Change::Renamed { .. } => 2,
            Change::Added(_) => 3,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Deleted(r) | Change::Added(r) => write!(f, "{} {}", self.label(), r.path),
            Change::Changed { new, fields, .. } => {
                let fields: Vec<String> = fields.iter().map(|c| c.to_string()).collect();
                write!(f, "changed {} ({})", new.path, fields.join(", "))
            }
            Change::Renamed { old, new } => write!(f, "renamed {} -> {}", old.path, new.path),
        }
    }
}

/// Everything one generation did to the matched entries.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: Generation,
    pub changes: Vec<Change>,
}

/// Per-generation diff of the entries matching `globs` (all entries when
/// empty) over `range`, clipped to the generations the store knows.
/// Generations that touched nothing are left out.
pub fn report(
    store: &Store,
    globs: &[String],
    range: &GenerationRange,
    options: &ReportOptions,
) -> Result<Vec<GenerationReport>> {
    let mut range = *range;
    range.clip_to(&store.generation_span()?);
    let Some(ids) = range.ids() else {
        return Ok(Vec::new());
    };

    let mut reports = Vec::new();
    for id in ids {
        let Some(generation) = store.generation(id)? else {
            continue;
        };
        let touched = GenerationRange::changed_in(id);
        let records = if globs.is_empty() {
            store.find_all(Some(&touched))
        } else {
            store.find_by_glob(globs, Some(&touched))
        };
        let mut entries = Vec::new();
        for record in records {
            let record = record?;
            if !record.is_directory() {
                entries.push(record);
            }
        }

        let changes = classify(id, entries, options);
        debug!("Generation {}: {} changes", id, changes.len());
        if !changes.is_empty() {
            reports.push(GenerationReport { generation, changes });
        }
    }
    Ok(reports)
}

/// Sort the versions touched by `generation` into changes.
pub fn classify(generation: i64, records: Vec<Record>, options: &ReportOptions) -> Vec<Change> {
    let mut changes = Vec::new();

    let mut by_path: AHashMap<String, Vec<Record>> = AHashMap::new();
    for record in records {
        by_path.entry(record.path.clone()).or_default().push(record);
    }

    let mut remainder = Vec::new();
    for (_, mut versions) in by_path {
        if versions.len() < 2 {
            remainder.append(&mut versions);
            continue;
        }
        sort_by_birth(&mut versions);
        let (Some(old), Some(new)) = (versions.first(), versions.last()) else {
            continue;
        };
        if !options.show_metadata_churn && same_content(old, new) {
            continue;
        }
        changes.push(Change::Changed {
            fields: describe_changes(old, new),
            old: old.clone(),
            new: new.clone(),
        });
    }

    // A rename is one version dying and another being born on the same inode.
    let mut by_inode: AHashMap<i64, Vec<Record>> = AHashMap::new();
    let mut singles = Vec::new();
    for record in remainder {
        match record.ino {
            Some(ino) => by_inode.entry(ino).or_default().push(record),
            None => singles.push(record),
        }
    }
    for (_, mut group) in by_inode {
        if group.len() > 1 {
            sort_by_birth(&mut group);
            let died = group.iter().position(|r| r.death == Some(generation));
            let born = group
                .iter()
                .rposition(|r| r.birth == Some(generation));
            if let (Some(died), Some(born)) = (died, born) {
                if died != born {
                    let new = group[born].clone();
                    let old = group[died].clone();
                    group.retain(|r| r.id != old.id && r.id != new.id);
                    changes.push(Change::Renamed { old, new });
                }
            }
        }
        singles.append(&mut group);
    }

    for record in singles {
        if record.birth == Some(generation) {
            changes.push(Change::Added(record));
        } else if record.death == Some(generation) {
            changes.push(Change::Deleted(record));
        }
    }

    changes.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.path().cmp(b.path())));
    changes
}

fn sort_by_birth(records: &mut [Record]) {
    records.sort_by_key(|r| (r.birth.unwrap_or(-1), r.id.unwrap_or_default()));
}

/// Content equality for churn suppression. A side without a fingerprint is
/// never considered the same.
fn same_content(old: &Record, new: &Record) -> bool {
    match (&old.blob, &new.blob) {
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}

/// Human-readable list of the attributes that differ between two versions.
pub fn describe_changes(old: &Record, new: &Record) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &'static str, description: String| {
        changes.push(FieldChange { field, description });
    };

    if old.kind != new.kind {
        push("type", format!("{} -> {}", old.kind, new.kind));
    }

    let plain: [(&'static str, Option<i64>, Option<i64>); 6] = [
        ("ino", old.ino, new.ino),
        ("nlink", old.nlink, new.nlink),
        ("uid", old.uid, new.uid),
        ("gid", old.gid, new.gid),
        ("blksize", old.blksize, new.blksize),
        ("blocks", old.blocks, new.blocks),
    ];
    for (field, a, b) in plain {
        if a != b {
            push(field, format!("{} -> {}", show(a), show(b)));
        }
    }

    if old.mode != new.mode {
        let octal = |m: Option<i64>| m.map_or("-".to_string(), |m| format!("{:o}", m));
        push("mode", format!("{} -> {}", octal(old.mode), octal(new.mode)));
    }

    if old.size != new.size {
        let a = old.size.unwrap_or_default();
        let b = new.size.unwrap_or_default();
        let delta = human_bytes(a.abs_diff(b));
        let sign = if b >= a { '+' } else { '-' };
        push(
            "size",
            format!(
                "{} -> {} ({}{})",
                human_bytes(a.max(0) as u64),
                human_bytes(b.max(0) as u64),
                sign,
                delta
            ),
        );
    }

    for (field, a, b) in [("ctime", old.ctime, new.ctime), ("mtime", old.mtime, new.mtime)] {
        if a != b {
            let time = |t: Option<i64>| t.map_or("-".to_string(), format_time);
            push(field, format!("{} -> {}", time(a), time(b)));
        }
    }

    let content_differs = match (&old.blob, &new.blob) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.matches(b),
        _ => true,
    };
    if content_differs {
        push("content", String::new());
    }

    if old.target != new.target {
        let target = |t: &Option<String>| t.clone().unwrap_or_else(|| "-".to_string());
        push(
            "target",
            format!("{} -> {}", target(&old.target), target(&new.target)),
        );
    }

    changes
}

fn show(value: Option<i64>) -> String {
    value.map_or("-".to_string(), |v| v.to_string())
}
