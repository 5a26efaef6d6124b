use crate::record::{FileKind, Record};
use std::fs::{FileType, Metadata};

#[cfg(unix)]
pub fn file_kind(file_type: &FileType) -> FileKind {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_file() {
        FileKind::File
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Link
    } else if file_type.is_char_device() {
        FileKind::Chardev
    } else if file_type.is_block_device() {
        FileKind::Blockdev
    } else if file_type.is_fifo() {
        FileKind::Fifo
    } else if file_type.is_socket() {
        FileKind::Socket
    } else {
        FileKind::Unknown
    }
}

#[cfg(not(unix))]
pub fn file_kind(file_type: &FileType) -> FileKind {
    if file_type.is_file() {
        FileKind::File
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Link
    } else {
        FileKind::Unknown
    }
}

/// Copy lstat fields into the record. Timestamps are ns since the epoch.
#[cfg(unix)]
pub fn fill_stat(record: &mut Record, metadata: &Metadata) {
    use std::os::unix::fs::MetadataExt;

    const NANOS: i64 = 1_000_000_000;

    record.dev = Some(metadata.dev() as i64);
    record.ino = Some(metadata.ino() as i64);
    record.mode = Some(metadata.mode() as i64);
    record.nlink = Some(metadata.nlink() as i64);
    record.uid = Some(metadata.uid() as i64);
    record.gid = Some(metadata.gid() as i64);
    record.rdev = Some(metadata.rdev() as i64);
    record.size = Some(metadata.size() as i64);
    record.blksize = Some(metadata.blksize() as i64);
    record.blocks = Some(metadata.blocks() as i64);
    record.atime = Some(metadata.atime() * NANOS + metadata.atime_nsec());
    record.ctime = Some(metadata.ctime() * NANOS + metadata.ctime_nsec());
    record.mtime = Some(metadata.mtime() * NANOS + metadata.mtime_nsec());
}

#[cfg(not(unix))]
pub fn fill_stat(record: &mut Record, metadata: &Metadata) {
    use std::time::{SystemTime, UNIX_EPOCH};

    fn nanos(t: std::io::Result<SystemTime>) -> Option<i64> {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
    }

    record.size = Some(metadata.len() as i64);
    record.atime = nanos(metadata.accessed());
    record.mtime = nanos(metadata.modified());
    record.ctime = nanos(metadata.created());
}
