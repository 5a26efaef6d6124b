use crate::error::Result;
use crate::record::FileKind;
use crate::storage::Store;
use ahash::AHashMap;
use std::path::{Component, Path};
use tracing::debug;

/// Regular-file totals stored at or below `path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub path: String,
    pub files: usize,
    pub bytes: u64,
    /// Bytes below each direct child of `path`, largest first.
    pub children: Vec<(String, u64)>,
}

/// Disk usage of the alive records under `path`, computed from the store
/// alone. Only regular files count; a file at `path` itself counts towards
/// the totals but has no children.
pub fn disk_usage(store: &Store, path: &str) -> Result<DiskUsage> {
    let root = Path::new(path);
    let mut usage = DiskUsage {
        path: path.to_string(),
        ..Default::default()
    };
    let mut children: AHashMap<String, u64> = AHashMap::new();

    for record in store.find_under(path) {
        let record = record?;
        if record.kind != FileKind::File {
            continue;
        }
        let size = record.size.unwrap_or_default().max(0) as u64;
        usage.files += 1;
        usage.bytes += size;

        let child = Path::new(&record.path)
            .strip_prefix(root)
            .ok()
            .and_then(|rel| rel.components().next());
        if let Some(Component::Normal(name)) = child {
            *children.entry(name.to_string_lossy().into_owned()).or_default() += size;
        }
    }

    usage.children = children.into_iter().collect();
    usage
        .children
        .sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    debug!("{}: {} bytes in {} files", path, usage.bytes, usage.files);
    Ok(usage)
}
