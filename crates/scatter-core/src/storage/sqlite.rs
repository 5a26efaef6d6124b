use crate::error::Result;
use crate::generation::{now_nanos, Generation, GenerationRange};
use ahash::AHashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

const SCHEMA_VERSION: i64 = 1;

/// Directory ids remembered between upserts; cleared when it grows past this.
const DIRECTORY_CACHE_LIMIT: usize = 100_000;

/// Auto-commit thresholds. `None` disables the respective trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub max_insert_count: Option<usize>,
    pub max_insert_bytes: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_insert_count: Some(5000),
            max_insert_bytes: Some(100 * 1000 * 1000),
        }
    }
}

impl StoreOptions {
    /// Never auto-commit; everything waits for an explicit `commit()`.
    pub fn unbounded() -> Self {
        Self {
            max_insert_count: None,
            max_insert_bytes: None,
        }
    }
}

/// The generation-versioned metadata store.
///
/// Writes are staged in an open transaction that is committed explicitly,
/// when an auto-commit threshold is crossed, or when the store is dropped.
pub struct Store {
    conn: Connection,
    options: StoreOptions,
    generation: Option<i64>,
    in_transaction: bool,
    insert_count: usize,
    insert_bytes: u64,
    last_commit: Instant,
    pub(crate) directory_cache: AHashMap<String, i64>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened store {}", path.as_ref().display());
        Self::from_connection(conn, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, options)
    }

    fn from_connection(conn: Connection, options: StoreOptions) -> Result<Self> {
        let store = Store {
            conn,
            options,
            generation: None,
            in_transaction: false,
            insert_count: 0,
            insert_bytes: 0,
            last_commit: Instant::now(),
            directory_cache: AHashMap::new(),
        };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<()> {
        // A second writer waits on the lock instead of failing right away.
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 300000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache, 300s busy timeout)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        self.conn.execute_batch(include_str!("schema.sql"))?;
        self.conn.execute_batch(include_str!("indices.sql"))?;

        if version < SCHEMA_VERSION {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
            debug!("Schema initialized (version {})", SCHEMA_VERSION);
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    pub fn set_options(&mut self, options: StoreOptions) {
        self.options = options;
    }

    // ── Units of work ────────────────────────────────────────────

    pub(crate) fn begin_write(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    pub fn has_pending_writes(&self) -> bool {
        self.in_transaction
    }

    /// Make everything staged so far durable.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;

            let elapsed = self.last_commit.elapsed().as_secs_f64();
            debug!(
                "Commit: {} inserts, {} bytes fingerprinted, {:.2}s, {:.2} MB/s",
                self.insert_count,
                self.insert_bytes,
                elapsed,
                if elapsed > 0.0 {
                    self.insert_bytes as f64 / 1_000_000.0 / elapsed
                } else {
                    0.0
                }
            );
        }
        self.insert_count = 0;
        self.insert_bytes = 0;
        self.last_commit = Instant::now();
        Ok(())
    }

    /// Count one inserted record and commit once a threshold is crossed.
    pub(crate) fn note_insert(&mut self, fingerprinted_bytes: u64) -> Result<()> {
        self.insert_count += 1;
        self.insert_bytes += fingerprinted_bytes;

        let count_exceeded = self
            .options
            .max_insert_count
            .is_some_and(|max| self.insert_count >= max);
        let bytes_exceeded = self
            .options
            .max_insert_bytes
            .is_some_and(|max| self.insert_bytes >= max);

        if count_exceeded || bytes_exceeded {
            info!(
                "Auto-commit after {} inserts / {} bytes",
                self.insert_count, self.insert_bytes
            );
            self.commit()?;
        }
        Ok(())
    }

    // ── Generations ──────────────────────────────────────────────

    /// Open a new generation; it stamps every birth and death until the next
    /// call.
    pub fn begin_generation(&mut self, command: &str) -> Result<i64> {
        self.begin_write()?;
        self.conn.execute(
            "INSERT INTO generation (start_time, end_time, command) VALUES (?1, NULL, ?2)",
            params![now_nanos(), command],
        )?;
        let id = self.conn.last_insert_rowid();
        self.commit()?;
        self.generation = Some(id);
        info!("Generation {} started: {}", id, command);
        Ok(id)
    }

    pub fn end_generation(&mut self, generation: i64) -> Result<()> {
        self.begin_write()?;
        self.conn.execute(
            "UPDATE generation SET end_time = ?1 WHERE id = ?2",
            params![now_nanos(), generation],
        )?;
        self.commit()?;
        info!("Generation {} closed", generation);
        Ok(())
    }

    pub fn current_generation(&self) -> Option<i64> {
        self.generation
    }

    /// Stamp subsequent writes with an existing generation.
    pub fn use_generation(&mut self, generation: i64) {
        self.generation = Some(generation);
    }

    pub fn generations(&self, range: &GenerationRange) -> Result<Vec<Generation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, command FROM generation \
             WHERE (?1 IS NULL OR id >= ?1) AND (?2 IS NULL OR id < ?2) \
             ORDER BY id",
        )?;
        let generations = stmt
            .query_map(params![range.start, range.end], |row| {
                Ok(Generation {
                    id: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    command: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(generations)
    }

    pub fn generation(&self, id: i64) -> Result<Option<Generation>> {
        let generation = self
            .conn
            .query_row(
                "SELECT id, start_time, end_time, command FROM generation WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Generation {
                        id: row.get(0)?,
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        command: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(generation)
    }

    /// Half-open span of all known generation ids; `[0, 0)` when empty.
    pub fn generation_span(&self) -> Result<GenerationRange> {
        let (min, max): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(id), MAX(id) FROM generation",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match (min, max) {
            (Some(min), Some(max)) => GenerationRange::new(Some(min), Some(max + 1)),
            _ => GenerationRange::new(Some(0), Some(0)),
        })
    }

    pub(crate) fn trim_directory_cache(&mut self) {
        if self.directory_cache.len() > DIRECTORY_CACHE_LIMIT {
            self.directory_cache.clear();
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Err(e) = self.commit() {
                error!("Failed to commit staged writes on close: {}", e);
            }
        }
    }
}
