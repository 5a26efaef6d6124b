use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

/// Entries to leave out of a reconciliation: plain path prefixes, or glob
/// patterns when the rule contains `*`, `?` or `[`.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    prefixes: Vec<String>,
    patterns: Vec<Pattern>,
}

impl Exclusions {
    pub fn new(rules: &[String]) -> Self {
        let mut exclusions = Exclusions::default();
        for rule in rules {
            if rule.contains(['*', '?', '[']) {
                match Pattern::new(rule) {
                    Ok(p) => exclusions.patterns.push(p),
                    Err(e) => error!("Invalid glob pattern '{}': {}", rule, e),
                }
            } else {
                let prefix = rule.trim_end_matches('/');
                exclusions
                    .prefixes
                    .push(if prefix.is_empty() { "/" } else { prefix }.to_string());
            }
        }
        exclusions
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.patterns.is_empty()
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let by_prefix = self.prefixes.iter().any(|prefix| {
            prefix == "/"
                || path == prefix
                || (path.starts_with(prefix.as_str())
                    && path.as_bytes().get(prefix.len()) == Some(&b'/'))
        });
        by_prefix || self.patterns.iter().any(|pattern| pattern.matches(path))
    }
}

/// Direct entries of `dir`, sorted by name, symlinks not followed.
///
/// The outer error means `dir` itself could not be read. Inner errors belong
/// to single entries and leave the rest of the listing usable.
pub fn list_directory(dir: &Path) -> io::Result<Vec<io::Result<PathBuf>>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => entries.push(Ok(entry.into_path())),
            Err(err) if err.depth() == 0 => {
                let kind = err.io_error().map_or(io::ErrorKind::Other, |e| e.kind());
                return Err(io::Error::new(
                    kind,
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
            Err(err) => entries.push(Err(io::Error::from(err))),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_exclusions() {
        let exclusions = Exclusions::new(&[
            "/data/cache/".to_string(),
            "*.tmp".to_string(),
        ]);
        assert!(exclusions.is_excluded("/data/cache"));
        assert!(exclusions.is_excluded("/data/cache/x"));
        assert!(!exclusions.is_excluded("/data/cachefile"));
        assert!(exclusions.is_excluded("/home/a.tmp"));
        assert!(!exclusions.is_excluded("/home/a.txt"));
        assert!(Exclusions::new(&[]).is_empty());
    }

    #[test]
    fn test_list_directory_sorted_and_shallow() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b"), "b").unwrap();
        fs::write(dir.path().join("a"), "a").unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("c").join("nested"), "n").unwrap();

        let names: Vec<String> = list_directory(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.unwrap().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(list_directory(&dir.path().join("gone")).is_err());
    }
}
