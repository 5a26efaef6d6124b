use super::sqlite::Store;
use crate::error::{Error, Result};
use crate::record::{parent_of, Record};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

impl Store {
    // ── Directory nodes ──────────────────────────────────────────

    /// Id of the directory node for `path`, creating it and every missing
    /// ancestor. Existing nodes without a parent link get one backfilled.
    pub fn ensure_directory(&mut self, path: &str) -> Result<i64> {
        if let Some(&id) = self.directory_cache.get(path) {
            return Ok(id);
        }
        self.begin_write()?;

        let existing: Option<(i64, Option<i64>)> = self
            .connection()
            .query_row(
                "SELECT id, parent_id FROM directory WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let parent_path = parent_of(path).filter(|p| p != path);

        let id = match existing {
            Some((id, Some(_))) => id,
            Some((id, None)) => {
                if let Some(parent_path) = parent_path {
                    let parent_id = self.ensure_directory(&parent_path)?;
                    self.connection().execute(
                        "UPDATE directory SET parent_id = ?1 WHERE id = ?2",
                        params![parent_id, id],
                    )?;
                    debug!("Backfilled parent of directory node {}", path);
                }
                id
            }
            None => {
                let parent_id = match parent_path {
                    Some(parent_path) => Some(self.ensure_directory(&parent_path)?),
                    None => None,
                };
                self.connection().execute(
                    "INSERT INTO directory (path, parent_id) VALUES (?1, ?2)",
                    params![path, parent_id],
                )?;
                self.connection().last_insert_rowid()
            }
        };

        self.trim_directory_cache();
        self.directory_cache.insert(path.to_string(), id);
        Ok(id)
    }

    pub fn directory_id(&self, path: &str) -> Result<Option<i64>> {
        if let Some(&id) = self.directory_cache.get(path) {
            return Ok(Some(id));
        }
        let id = self
            .connection()
            .query_row(
                "SELECT id FROM directory WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ── Records ──────────────────────────────────────────────────

    /// Insert a new version of `record`. Birth is the current generation
    /// unless the record already carries one. Returns the new row id.
    pub fn upsert(&mut self, record: &Record) -> Result<i64> {
        let birth = match record.birth {
            Some(birth) => birth,
            None => self.current_generation().ok_or(Error::NoGeneration)?,
        };

        self.begin_write()?;

        let directory_id = match record.parent_path() {
            Some(parent) => Some(self.ensure_directory(&parent)?),
            None => None,
        };

        let conn = self.connection();
        conn.prepare_cached(
            "INSERT INTO fileinfo \
             (type, path, dev, ino, mode, nlink, uid, gid, rdev, size, blksize, blocks, \
              atime, ctime, mtime, time, birth, death, directory_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                     ?17, ?18, ?19)",
        )?
        .execute(params![
            record.kind,
            record.path,
            record.dev,
            record.ino,
            record.mode,
            record.nlink,
            record.uid,
            record.gid,
            record.rdev,
            record.size,
            record.blksize,
            record.blocks,
            record.atime,
            record.ctime,
            record.mtime,
            record.time,
            birth,
            record.death,
            directory_id,
        ])?;
        let id = conn.last_insert_rowid();

        let mut fingerprinted = 0;
        if let Some(blob) = &record.blob {
            conn.prepare_cached(
                "INSERT INTO blobinfo (fileinfo_id, size, md5, sha1, crc32) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![id, blob.size as i64, blob.md5, blob.sha1, blob.crc32])?;
            fingerprinted = blob.size;
        }

        if let Some(target) = &record.target {
            conn.prepare_cached("INSERT INTO linkinfo (fileinfo_id, target) VALUES (?1, ?2)")?
                .execute(params![id, target])?;
        }

        debug!("Stored {} (id {}, birth {})", record.path, id, birth);
        self.note_insert(fingerprinted)?;
        Ok(id)
    }

    /// Stamp this exact record with the current generation as death.
    /// Returns 0 when the record was already dead.
    pub fn retire(&mut self, record: &Record) -> Result<usize> {
        let id = record
            .id
            .ok_or_else(|| Error::NotStored(record.path.clone()))?;
        let generation = self.current_generation().ok_or(Error::NoGeneration)?;

        self.begin_write()?;
        let count = self.connection().execute(
            "UPDATE fileinfo SET death = ?1 WHERE id = ?2 AND death IS NULL",
            params![generation, id],
        )?;
        debug!("Retired {} (id {}, {} rows)", record.path, id, count);
        Ok(count)
    }

    /// Retire a directory record and every alive record below it. Returns
    /// the number of rows retired. A non-directory record is retired alone
    /// with a warning.
    pub fn retire_recursive(&mut self, record: &Record) -> Result<usize> {
        if !record.is_directory() {
            warn!(
                "{}: recursive retirement requested on a {}, retiring the entry only",
                record.path, record.kind
            );
            return self.retire(record);
        }

        let own = self.retire(record)?;
        let generation = self.current_generation().ok_or(Error::NoGeneration)?;
        let count = self.connection().execute(
            "WITH RECURSIVE subtree(id) AS ( \
                 SELECT id FROM directory WHERE path = ?1 \
                 UNION \
                 SELECT d.id FROM directory d JOIN subtree s ON d.parent_id = s.id \
             ) \
             UPDATE fileinfo SET death = ?2 \
             WHERE death IS NULL AND directory_id IN (SELECT id FROM subtree)",
            params![record.path, generation],
        )?;
        debug!("Retired {} recursively ({} descendants)", record.path, count);
        Ok(own + count)
    }

    /// Operator-requested removal of the alive record at `path`. Directories
    /// require `recursive`; nothing is touched otherwise.
    pub fn remove_path(&mut self, path: &str, recursive: bool) -> Result<usize> {
        let Some(record) = self.find_one_by_path(path)? else {
            return Ok(0);
        };

        if record.is_directory() {
            if !recursive {
                return Err(Error::DirectoryNeedsRecursive(path.to_string()));
            }
            self.retire_recursive(&record)
        } else {
            self.retire(&record)
        }
    }
}
