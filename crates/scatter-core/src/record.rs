use crate::fingerprint::Fingerprint;
use crate::generation::now_nanos;
use crate::platform;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Filesystem entry type as stored in the `fileinfo.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Chardev,
    Blockdev,
    Fifo,
    Link,
    Socket,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Directory => "directory",
            FileKind::Chardev => "chardev",
            FileKind::Blockdev => "blockdev",
            FileKind::Fifo => "fifo",
            FileKind::Link => "link",
            FileKind::Socket => "socket",
            FileKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown file type '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for FileKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "file" => FileKind::File,
            "directory" => FileKind::Directory,
            "chardev" => FileKind::Chardev,
            "blockdev" => FileKind::Blockdev,
            "fifo" => FileKind::Fifo,
            "link" => FileKind::Link,
            "socket" => FileKind::Socket,
            "unknown" => FileKind::Unknown,
            other => return Err(UnknownKind(other.to_string())),
        })
    }
}

impl ToSql for FileKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

// A type string the reader does not know means the schema drifted; refuse it.
impl FromSql for FileKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One version of a filesystem entry's attributes.
///
/// `id`, `birth`, `death` and `directory_id` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<i64>,
    pub kind: FileKind,
    pub path: String,

    pub dev: Option<i64>,
    pub ino: Option<i64>,
    pub mode: Option<i64>,
    pub nlink: Option<i64>,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    pub rdev: Option<i64>,

    pub size: Option<i64>,
    pub blksize: Option<i64>,
    pub blocks: Option<i64>,

    pub atime: Option<i64>,
    pub ctime: Option<i64>,
    pub mtime: Option<i64>,

    /// When this record was observed, ns since the epoch.
    pub time: Option<i64>,

    pub birth: Option<i64>,
    pub death: Option<i64>,

    pub blob: Option<Fingerprint>,
    pub target: Option<String>,

    pub directory_id: Option<i64>,
}

impl Record {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            id: None,
            kind,
            path: path.into(),
            dev: None,
            ino: None,
            mode: None,
            nlink: None,
            uid: None,
            gid: None,
            rdev: None,
            size: None,
            blksize: None,
            blocks: None,
            atime: None,
            ctime: None,
            mtime: None,
            time: None,
            birth: None,
            death: None,
            blob: None,
            target: None,
            directory_id: None,
        }
    }

    /// lstat `path` into a record. Symlinks are not followed; their target is
    /// recorded instead. Regular files get a fingerprint when `checksums` is set.
    pub fn from_path(path: &Path, checksums: bool) -> io::Result<Self> {
        let abspath = absolute_path(path)?;
        let metadata = fs::symlink_metadata(&abspath)?;
        let kind = platform::file_kind(&metadata.file_type());

        let mut record = Record::new(abspath.to_string_lossy().into_owned(), kind);
        platform::fill_stat(&mut record, &metadata);
        record.time = Some(now_nanos());

        match kind {
            FileKind::File if checksums => {
                record.blob = Some(Fingerprint::from_file(&abspath)?);
            }
            FileKind::Link => {
                let target = fs::read_link(&abspath)?;
                record.target = Some(target.to_string_lossy().into_owned());
            }
            _ => {}
        }

        Ok(record)
    }

    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Path of the containing directory, `None` for a filesystem root.
    pub fn parent_path(&self) -> Option<String> {
        parent_of(&self.path)
    }

    /// Attribute equality used for change detection. Ignores store-assigned
    /// fields, `dev` (not stable across reboots), `atime` and the observation
    /// time.
    pub fn same_attributes(&self, other: &Record) -> bool {
        let same_blob = match (&self.blob, &other.blob) {
            (None, None) => true,
            (Some(a), Some(b)) => a.matches(b),
            _ => false,
        };

        self.kind == other.kind
            && self.path == other.path
            && self.ino == other.ino
            && self.mode == other.mode
            && self.nlink == other.nlink
            && self.uid == other.uid
            && self.gid == other.gid
            && self.rdev == other.rdev
            && self.size == other.size
            && self.blksize == other.blksize
            && self.blocks == other.blocks
            && self.ctime == other.ctime
            && self.mtime == other.mtime
            && self.target == other.target
            && same_blob
    }
}

pub fn parent_of(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
}

/// Absolute form of `path` without touching the filesystem: `.` and `..`
/// are resolved lexically and symlinks are left as they are.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> Record {
        let mut r = Record::new(path, FileKind::File);
        r.dev = Some(2049);
        r.ino = Some(42);
        r.mode = Some(0o100644);
        r.size = Some(3);
        r.atime = Some(1);
        r.mtime = Some(2);
        r.ctime = Some(2);
        r.time = Some(99);
        r
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            FileKind::File,
            FileKind::Directory,
            FileKind::Chardev,
            FileKind::Blockdev,
            FileKind::Fifo,
            FileKind::Link,
            FileKind::Socket,
            FileKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
        assert!("symlink".parse::<FileKind>().is_err());
    }

    #[test]
    fn test_same_attributes_ignores_volatile_fields() {
        let a = sample("/x/a");
        let mut b = a.clone();
        b.dev = Some(1);
        b.atime = Some(1000);
        b.time = Some(5000);
        b.id = Some(7);
        b.birth = Some(3);
        b.death = Some(4);
        assert!(a.same_attributes(&b));

        b.mtime = Some(3);
        assert!(!a.same_attributes(&b));
    }

    #[test]
    fn test_same_attributes_compares_fingerprint_and_target() {
        let mut a = sample("/x/a");
        let mut b = a.clone();

        let mut fa = Fingerprint::new(3);
        fa.sha1 = Some("aaa".into());
        a.blob = Some(fa.clone());
        assert!(!a.same_attributes(&b));

        b.blob = Some(fa);
        assert!(a.same_attributes(&b));

        b.target = Some("elsewhere".into());
        assert!(!a.same_attributes(&b));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_path_is_lexical() {
        assert_eq!(
            absolute_path(Path::new("/a/./b/../c")).unwrap(),
            PathBuf::from("/a/c")
        );
        assert_eq!(absolute_path(Path::new("/..")).unwrap(), PathBuf::from("/"));
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute_path(Path::new("x")).unwrap(), cwd.join("x"));
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a/b/c").as_deref(), Some("/a/b"));
        assert_eq!(parent_of("/a").as_deref(), Some("/"));
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("a"), None);
    }

    #[test]
    fn test_from_path_file_and_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"abc").unwrap();

        let rec = Record::from_path(&file, true).unwrap();
        assert_eq!(rec.kind, FileKind::File);
        assert_eq!(rec.size, Some(3));
        assert_eq!(rec.blob.as_ref().map(|b| b.size), Some(3));

        let rec = Record::from_path(&file, false).unwrap();
        assert!(rec.blob.is_none());

        #[cfg(unix)]
        {
            let link = dir.path().join("l.lnk");
            std::os::unix::fs::symlink("f.txt", &link).unwrap();
            let rec = Record::from_path(&link, true).unwrap();
            assert_eq!(rec.kind, FileKind::Link);
            assert_eq!(rec.target.as_deref(), Some("f.txt"));
            assert!(rec.blob.is_none());
        }
    }
}
