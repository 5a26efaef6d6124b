use super::models::Finding;
use super::sqlite::Store;
use crate::error::Result;
use crate::record::parent_of;
use rusqlite::params;
use tracing::{debug, info, warn};

const REBUILD_PAGE: i64 = 5000;

impl Store {
    // ── Integrity ────────────────────────────────────────────────

    /// Scan the store for invariant violations. Nothing is repaired.
    pub fn integrity_check(&self) -> Result<Vec<Finding>> {
        let conn = self.connection();
        let mut findings = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT path, COUNT(*) FROM fileinfo WHERE death IS NULL \
             GROUP BY path HAVING COUNT(*) > 1 ORDER BY path",
        )?;
        findings.extend(
            stmt.query_map([], |row| {
                Ok(Finding::MultipleAlive {
                    path: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        );

        let mut stmt =
            conn.prepare("SELECT id, path FROM fileinfo WHERE birth IS NULL ORDER BY id")?;
        findings.extend(
            stmt.query_map([], |row| {
                Ok(Finding::MissingBirth {
                    id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        );

        let mut stmt = conn.prepare(
            "SELECT b.id, b.fileinfo_id FROM blobinfo b \
             LEFT JOIN fileinfo f ON f.id = b.fileinfo_id \
             WHERE f.id IS NULL ORDER BY b.id",
        )?;
        findings.extend(
            stmt.query_map([], |row| {
                Ok(Finding::OrphanedBlob {
                    id: row.get(0)?,
                    fileinfo_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        );

        let mut stmt = conn.prepare(
            "SELECT l.id, l.fileinfo_id FROM linkinfo l \
             LEFT JOIN fileinfo f ON f.id = l.fileinfo_id \
             WHERE f.id IS NULL ORDER BY l.id",
        )?;
        findings.extend(
            stmt.query_map([], |row| {
                Ok(Finding::OrphanedLink {
                    id: row.get(0)?,
                    fileinfo_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        );

        let mut stmt =
            conn.prepare("SELECT id, path FROM directory WHERE parent_id = id ORDER BY id")?;
        findings.extend(
            stmt.query_map([], |row| {
                Ok(Finding::SelfParentDirectory {
                    id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        );

        for finding in &findings {
            warn!("Integrity: {}", finding);
        }
        info!("Integrity check finished: {} findings", findings.len());
        Ok(findings)
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Recreate the directory table from the paths of all stored records.
    pub fn rebuild_directory_table(&mut self) -> Result<usize> {
        self.begin_write()?;
        self.connection().execute_batch(
            "UPDATE fileinfo SET directory_id = NULL;
             DELETE FROM directory;",
        )?;
        self.directory_cache.clear();

        let mut last_id = 0i64;
        let mut updated = 0;
        loop {
            let page: Vec<(i64, String)> = {
                let mut stmt = self.connection().prepare_cached(
                    "SELECT id, path FROM fileinfo WHERE id > ?1 ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![last_id, REBUILD_PAGE], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            let Some(&(id, _)) = page.last() else {
                break;
            };
            last_id = id;

            for (id, path) in page {
                let Some(parent) = parent_of(&path) else {
                    continue;
                };
                let directory_id = self.ensure_directory(&parent)?;
                self.connection().execute(
                    "UPDATE fileinfo SET directory_id = ?1 WHERE id = ?2",
                    params![directory_id, id],
                )?;
                updated += 1;
            }
            debug!("Directory rebuild reached fileinfo id {}", last_id);
        }

        self.commit()?;
        info!("Directory table rebuilt for {} records", updated);
        Ok(updated)
    }

    /// Keep only the newest alive record for each path that has several.
    /// Returns the number of records deleted.
    pub fn cleanup_double_alive(&mut self) -> Result<usize> {
        self.begin_write()?;
        let conn = self.connection();

        let doomed = "SELECT f.id FROM fileinfo f \
             WHERE f.death IS NULL AND f.id < ( \
                 SELECT MAX(g.id) FROM fileinfo g \
                 WHERE g.path = f.path AND g.death IS NULL)";

        conn.execute(
            &format!("DELETE FROM blobinfo WHERE fileinfo_id IN ({})", doomed),
            [],
        )?;
        conn.execute(
            &format!("DELETE FROM linkinfo WHERE fileinfo_id IN ({})", doomed),
            [],
        )?;
        let deleted = conn.execute(&format!("DELETE FROM fileinfo WHERE id IN ({})", doomed), [])?;

        self.commit()?;
        info!("Removed {} superseded alive records", deleted);
        Ok(deleted)
    }

    /// Drop every secondary index and create them again.
    pub fn rebuild_indices(&mut self) -> Result<()> {
        self.begin_write()?;
        let names: Vec<String> = {
            let mut stmt = self.connection().prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'index' AND name NOT LIKE 'sqlite_autoindex_%'",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
        };

        for name in &names {
            debug!("Dropping index {}", name);
            self.connection()
                .execute_batch(&format!("DROP INDEX IF EXISTS \"{}\"", name))?;
        }
        self.connection().execute_batch(include_str!("indices.sql"))?;
        self.commit()?;
        info!("Rebuilt {} indices", names.len());
        Ok(())
    }

    /// Reclaim free pages. Staged writes are committed first.
    pub fn vacuum(&mut self) -> Result<()> {
        self.commit()?;
        self.connection().execute_batch("VACUUM")?;
        info!("Store vacuumed");
        Ok(())
    }
}
