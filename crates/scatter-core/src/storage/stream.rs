use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::record::Record;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::VecDeque;
use std::iter::Peekable;

const PAGE_SIZE: usize = 512;

pub(crate) const RECORD_SELECT: &str = "SELECT f.id, f.type, f.path, f.dev, f.ino, f.mode, \
     f.nlink, f.uid, f.gid, f.rdev, f.size, f.blksize, f.blocks, f.atime, f.ctime, f.mtime, \
     f.time, f.birth, f.death, f.directory_id, b.id, b.size, b.md5, b.sha1, b.crc32, l.target \
     FROM fileinfo f \
     LEFT JOIN blobinfo b ON b.fileinfo_id = f.id \
     LEFT JOIN linkinfo l ON l.fileinfo_id = f.id";

pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let blob_id: Option<i64> = row.get(20)?;
    let blob = match blob_id {
        Some(_) => Some(Fingerprint {
            size: row.get::<_, Option<i64>>(21)?.unwrap_or_default() as u64,
            md5: row.get(22)?,
            sha1: row.get(23)?,
            crc32: row.get::<_, Option<i64>>(24)?.map(|crc| crc as u32),
        }),
        None => None,
    };

    Ok(Record {
        id: row.get(0)?,
        kind: row.get(1)?,
        path: row.get(2)?,
        dev: row.get(3)?,
        ino: row.get(4)?,
        mode: row.get(5)?,
        nlink: row.get(6)?,
        uid: row.get(7)?,
        gid: row.get(8)?,
        rdev: row.get(9)?,
        size: row.get(10)?,
        blksize: row.get(11)?,
        blocks: row.get(12)?,
        atime: row.get(13)?,
        ctime: row.get(14)?,
        mtime: row.get(15)?,
        time: row.get(16)?,
        birth: row.get(17)?,
        death: row.get(18)?,
        directory_id: row.get(19)?,
        blob,
        target: row.get(25)?,
    })
}

/// Sort key of a stream; also the keyset used to resume after a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyOrder {
    Id,
    Birth,
    Path,
    Sha1,
}

impl KeyOrder {
    fn order_by(&self) -> &'static str {
        match self {
            KeyOrder::Id => "f.id",
            KeyOrder::Birth => "IFNULL(f.birth, -1), f.id",
            KeyOrder::Path => "f.path, f.id",
            KeyOrder::Sha1 => "b.sha1, f.id",
        }
    }

    fn after(&self, last: &Record) -> (&'static str, Vec<Value>) {
        let id = Value::Integer(last.id.unwrap_or_default());
        match self {
            KeyOrder::Id => ("f.id > ?", vec![id]),
            KeyOrder::Birth => {
                let birth = Value::Integer(last.birth.unwrap_or(-1));
                (
                    "(IFNULL(f.birth, -1) > ? OR (IFNULL(f.birth, -1) = ? AND f.id > ?))",
                    vec![birth.clone(), birth, id],
                )
            }
            KeyOrder::Path => {
                let path = Value::Text(last.path.clone());
                (
                    "(f.path > ? OR (f.path = ? AND f.id > ?))",
                    vec![path.clone(), path, id],
                )
            }
            KeyOrder::Sha1 => {
                let sha1 = Value::Text(sha1_of(last).unwrap_or_default().to_string());
                (
                    "(b.sha1 > ? OR (b.sha1 = ? AND f.id > ?))",
                    vec![sha1.clone(), sha1, id],
                )
            }
        }
    }
}

/// Lazy sequence of records for one query.
///
/// Rows are fetched a page at a time, each page by a fresh statement resuming
/// after the last key seen, so any number of streams can be open on the same
/// store without invalidating each other.
pub struct RecordStream<'a> {
    conn: &'a Connection,
    condition: String,
    params: Vec<Value>,
    order: KeyOrder,
    buffer: VecDeque<Record>,
    last: Option<Record>,
    done: bool,
}

impl<'a> RecordStream<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        condition: String,
        params: Vec<Value>,
        order: KeyOrder,
    ) -> Self {
        Self {
            conn,
            condition,
            params,
            order,
            buffer: VecDeque::new(),
            last: None,
            done: false,
        }
    }

    pub(crate) fn empty(conn: &'a Connection) -> Self {
        let mut stream = Self::new(conn, "0".to_string(), Vec::new(), KeyOrder::Id);
        stream.done = true;
        stream
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut sql = format!("{} WHERE ({})", RECORD_SELECT, self.condition);
        let mut params = self.params.clone();
        if let Some(last) = &self.last {
            let (condition, values) = self.order.after(last);
            sql.push_str(" AND ");
            sql.push_str(condition);
            params.extend(values);
        }
        sql.push_str(&format!(
            " ORDER BY {} LIMIT {}",
            self.order.order_by(),
            PAGE_SIZE
        ));

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), record_from_row)?;

        let mut fetched = 0;
        for row in rows {
            self.buffer.push_back(row?);
            fetched += 1;
        }

        if fetched < PAGE_SIZE {
            self.done = true;
        }
        if let Some(last) = self.buffer.back() {
            self.last = Some(last.clone());
        }
        Ok(())
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn sha1_of(record: &Record) -> Option<&str> {
    record.blob.as_ref().and_then(|b| b.sha1.as_deref())
}

/// Groups of alive records sharing a sha1 digest, in digest order.
pub struct DuplicateGroups<'a> {
    records: Peekable<RecordStream<'a>>,
}

impl<'a> DuplicateGroups<'a> {
    pub(crate) fn new(records: RecordStream<'a>) -> Self {
        Self {
            records: records.peekable(),
        }
    }
}

impl Iterator for DuplicateGroups<'_> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        let Some(sha1) = sha1_of(&first).map(str::to_string) else {
            return Some(Err(Error::MalformedRow(format!(
                "{}: duplicate candidate without sha1",
                first.path
            ))));
        };

        let mut group = vec![first];
        loop {
            match self.records.peek() {
                Some(Ok(next)) if sha1_of(next) == Some(sha1.as_str()) => {}
                _ => break,
            }
            if let Some(Ok(record)) = self.records.next() {
                group.push(record);
            }
        }
        Some(Ok(group))
    }
}
