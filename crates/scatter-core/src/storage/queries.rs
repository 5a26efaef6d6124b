use super::models::ChecksumKind;
use super::sqlite::Store;
use super::stream::{record_from_row, DuplicateGroups, KeyOrder, RecordStream, RECORD_SELECT};
use crate::error::Result;
use crate::generation::GenerationRange;
use crate::record::Record;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl Store {
    // ── Lookup by path ───────────────────────────────────────────

    /// The alive record at `path`, if any.
    pub fn find_one_by_path(&self, path: &str) -> Result<Option<Record>> {
        let record = self
            .connection()
            .prepare_cached(&format!(
                "{} WHERE f.path = ?1 AND f.death IS NULL ORDER BY f.id DESC LIMIT 1",
                RECORD_SELECT
            ))?
            .query_row(params![path], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Without a range: the alive record at `path`. With a range: every
    /// version selected by it, ordered by birth.
    pub fn find_by_path(&self, path: &str, range: Option<&GenerationRange>) -> RecordStream<'_> {
        let mut params = vec![Value::Text(path.to_string())];
        match range {
            None => RecordStream::new(
                self.connection(),
                "f.path = ? AND f.death IS NULL".to_string(),
                params,
                KeyOrder::Id,
            ),
            Some(range) => {
                let (condition, range_params) = range.sql_condition();
                params.extend(range_params);
                RecordStream::new(
                    self.connection(),
                    format!("f.path = ? AND {}", condition),
                    params,
                    KeyOrder::Birth,
                )
            }
        }
    }

    /// Alive direct children of the directory at `path`.
    pub fn find_in_directory(&self, path: &str) -> Result<RecordStream<'_>> {
        let Some(directory_id) = self.directory_id(path)? else {
            return Ok(RecordStream::empty(self.connection()));
        };
        Ok(RecordStream::new(
            self.connection(),
            "f.directory_id = ? AND f.death IS NULL".to_string(),
            vec![Value::Integer(directory_id)],
            KeyOrder::Path,
        ))
    }

    // ── Pattern and digest lookups ───────────────────────────────

    /// Records whose path matches any of the SQLite GLOB `patterns`. Without
    /// a range only alive records are returned.
    pub fn find_by_glob(
        &self,
        patterns: &[String],
        range: Option<&GenerationRange>,
    ) -> RecordStream<'_> {
        if patterns.is_empty() {
            return RecordStream::empty(self.connection());
        }

        let globs = vec!["f.path GLOB ?"; patterns.len()].join(" OR ");
        let mut params: Vec<Value> = patterns.iter().cloned().map(Value::Text).collect();
        let (range_condition, range_params) = self.range_condition(range);
        params.extend(range_params);

        RecordStream::new(
            self.connection(),
            format!("({}) AND {}", globs, range_condition),
            params,
            KeyOrder::Path,
        )
    }

    pub fn find_by_checksum(
        &self,
        kind: ChecksumKind,
        digest: &str,
        range: Option<&GenerationRange>,
    ) -> Result<RecordStream<'_>> {
        let mut params = vec![kind.bind(digest)?];
        let (range_condition, range_params) = self.range_condition(range);
        params.extend(range_params);

        Ok(RecordStream::new(
            self.connection(),
            format!("{} = ? AND {}", kind.column(), range_condition),
            params,
            KeyOrder::Path,
        ))
    }

    /// Every record selected by `range`; alive records without one.
    pub fn find_all(&self, range: Option<&GenerationRange>) -> RecordStream<'_> {
        let (condition, params) = self.range_condition(range);
        RecordStream::new(self.connection(), condition, params, KeyOrder::Path)
    }

    fn range_condition(&self, range: Option<&GenerationRange>) -> (String, Vec<Value>) {
        match range {
            Some(range) => range.sql_condition(),
            None => ("f.death IS NULL".to_string(), Vec::new()),
        }
    }

    /// Alive records at `prefix` or below it, in path order.
    pub fn find_under(&self, prefix: &str) -> RecordStream<'_> {
        let prefix = prefix.trim_end_matches('/');
        let params = vec![
            Value::Text(prefix.to_string()),
            Value::Text(format!("{}/", prefix)),
            Value::Text(format!("{}0", prefix)),
        ];
        RecordStream::new(
            self.connection(),
            "f.death IS NULL AND (f.path = ? OR (f.path >= ? AND f.path < ?))".to_string(),
            params,
            KeyOrder::Path,
        )
    }

    // ── Duplicates ───────────────────────────────────────────────

    /// Groups of two or more alive records under `prefix` sharing a sha1
    /// digest, ordered by digest.
    pub fn find_duplicates(&self, prefix: &str) -> DuplicateGroups<'_> {
        let prefix = prefix.trim_end_matches('/');
        let lower = format!("{}/", prefix);
        let upper = format!("{}0", prefix);
        debug!("Duplicate search between {:?} and {:?}", lower, upper);

        let under = |alias: &str| {
            format!(
                "({a}.path = ? OR ({a}.path >= ? AND {a}.path < ?))",
                a = alias
            )
        };
        let condition = format!(
            "f.death IS NULL AND {} AND b.sha1 IN ( \
                 SELECT b2.sha1 FROM fileinfo f2 \
                 JOIN blobinfo b2 ON b2.fileinfo_id = f2.id \
                 WHERE f2.death IS NULL AND b2.sha1 IS NOT NULL AND {} \
                 GROUP BY b2.sha1 HAVING COUNT(*) > 1)",
            under("f"),
            under("f2")
        );
        let bounds = [
            Value::Text(prefix.to_string()),
            Value::Text(lower),
            Value::Text(upper),
        ];
        let params = bounds.iter().chain(bounds.iter()).cloned().collect();

        DuplicateGroups::new(RecordStream::new(
            self.connection(),
            condition,
            params,
            KeyOrder::Sha1,
        ))
    }
}

/// Rewrite a shell glob so letters match either case under SQLite's
/// case-sensitive GLOB. Bracket expressions are copied verbatim.
pub fn case_insensitive_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 4);
    let mut in_brackets = false;
    for c in pattern.chars() {
        match c {
            '[' if !in_brackets => {
                in_brackets = true;
                out.push(c);
            }
            ']' if in_brackets => {
                in_brackets = false;
                out.push(c);
            }
            c if !in_brackets && c.is_alphabetic() => {
                let lower: String = c.to_lowercase().collect();
                let upper: String = c.to_uppercase().collect();
                if lower == upper {
                    out.push(c);
                } else {
                    out.push('[');
                    out.push_str(&lower);
                    out.push_str(&upper);
                    out.push(']');
                }
            }
            c => out.push(c),
        }
    }
    out
}
