use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::record::{FileKind, Record};
use crate::storage::Store;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;
use tracing::{debug, info};

/// One line of a snapshot file. Fields serialize in declaration order and
/// absent values are omitted, so exports diff cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FileKind>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlink: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdev: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blksize: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<SnapshotBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlob {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<u32>,
}

impl From<&Record> for SnapshotLine {
    fn from(r: &Record) -> Self {
        Self {
            kind: Some(r.kind),
            path: r.path.clone(),
            dev: r.dev,
            ino: r.ino,
            mode: r.mode,
            nlink: r.nlink,
            uid: r.uid,
            gid: r.gid,
            rdev: r.rdev,
            size: r.size,
            blksize: r.blksize,
            blocks: r.blocks,
            atime: r.atime,
            ctime: r.ctime,
            mtime: r.mtime,
            blob: r.blob.as_ref().map(|b| SnapshotBlob {
                size: b.size,
                sha1: b.sha1.clone(),
                md5: b.md5.clone(),
                crc32: b.crc32,
            }),
            target: r.target.clone(),
            time: r.time,
        }
    }
}

impl From<SnapshotLine> for Record {
    fn from(line: SnapshotLine) -> Self {
        let mut r = Record::new(line.path, line.kind.unwrap_or(FileKind::Unknown));
        r.dev = line.dev;
        r.ino = line.ino;
        r.mode = line.mode;
        r.nlink = line.nlink;
        r.uid = line.uid;
        r.gid = line.gid;
        r.rdev = line.rdev;
        r.size = line.size;
        r.blksize = line.blksize;
        r.blocks = line.blocks;
        r.atime = line.atime;
        r.ctime = line.ctime;
        r.mtime = line.mtime;
        r.blob = line.blob.map(|b| Fingerprint {
            size: b.size,
            md5: b.md5,
            sha1: b.sha1,
            crc32: b.crc32,
        });
        r.target = line.target;
        r.time = line.time;
        r
    }
}

/// Records parsed from a snapshot, one per non-empty line.
pub struct SnapshotReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for SnapshotReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str::<SnapshotLine>(&line)
                    .map(Record::from)
                    .map_err(|e| {
                        debug!("Snapshot line {} rejected: {}", self.line_no, e);
                        Error::Json(e)
                    }),
            );
        }
    }
}

/// Open a snapshot for reading. `-` is stdin; a `.gz` suffix is
/// decompressed on the fly.
pub fn open_snapshot(path: &Path) -> Result<SnapshotReader<Box<dyn BufRead>>> {
    let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else if is_gzip(path) {
        Box::new(BufReader::new(GzDecoder::new(File::open(path)?)))
    } else {
        Box::new(BufReader::new(File::open(path)?))
    };
    Ok(SnapshotReader::new(reader))
}

/// Write one JSON line per record. Returns the number written.
pub fn write_snapshot<W, I>(writer: &mut W, records: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<Record>>,
{
    let mut count = 0;
    for record in records {
        let record = record?;
        serde_json::to_writer(&mut *writer, &SnapshotLine::from(&record))?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Write a snapshot file; `-` is stdout and `.gz` compresses.
pub fn export_snapshot<I>(path: &Path, records: I) -> Result<usize>
where
    I: IntoIterator<Item = Result<Record>>,
{
    let count = if path.as_os_str() == "-" {
        write_snapshot(&mut io::stdout().lock(), records)?
    } else if is_gzip(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
        let count = write_snapshot(&mut encoder, records)?;
        encoder.finish()?.flush()?;
        count
    } else {
        write_snapshot(&mut BufWriter::new(File::create(path)?), records)?
    };
    info!("Exported {} records to {}", count, path.display());
    Ok(count)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

impl Store {
    /// Store every record of a snapshot under the current generation. A
    /// line matching the alive record at its path is skipped; one that
    /// differs retires it first. Returns the number of records stored.
    pub fn import_snapshot<R: BufRead>(&mut self, reader: SnapshotReader<R>) -> Result<usize> {
        let mut count = 0;
        let mut skipped = 0;
        for record in reader {
            let mut record = record?;
            record.birth = None;
            record.death = None;
            if let Some(old) = self.find_one_by_path(&record.path)? {
                if old.same_attributes(&record) {
                    skipped += 1;
                    continue;
                }
                if old.is_directory() && !record.is_directory() {
                    self.retire_recursive(&old)?;
                } else {
                    self.retire(&old)?;
                }
            }
            self.upsert(&record)?;
            count += 1;
        }
        self.commit()?;
        info!("Imported {} records, {} already present", count, skipped);
        Ok(count)
    }
}
