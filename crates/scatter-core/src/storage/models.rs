use crate::error::{Error, Result};
use rusqlite::types::Value;
use std::fmt;
use std::str::FromStr;

/// A node in the directory hierarchy index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    pub id: i64,
    pub path: String,
    pub parent_id: Option<i64>,
}

/// Digest column to search by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Crc32,
}

impl ChecksumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Crc32 => "crc32",
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "b.md5",
            ChecksumKind::Sha1 => "b.sha1",
            ChecksumKind::Crc32 => "b.crc32",
        }
    }

    /// Bind value for `digest`: hex text for md5/sha1, an integer parsed from
    /// eight hex digits for crc32.
    pub(crate) fn bind(&self, digest: &str) -> Result<Value> {
        let invalid = || Error::InvalidDigest {
            kind: self.as_str(),
            digest: digest.to_string(),
        };
        let expected_len = match self {
            ChecksumKind::Md5 => 32,
            ChecksumKind::Sha1 => 40,
            ChecksumKind::Crc32 => 8,
        };
        if digest.len() != expected_len || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        match self {
            ChecksumKind::Crc32 => u32::from_str_radix(digest, 16)
                .map(|crc| Value::Integer(crc as i64))
                .map_err(|_| invalid()),
            _ => Ok(Value::Text(digest.to_ascii_lowercase())),
        }
    }
}

impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumKind::Md5),
            "sha1" => Ok(ChecksumKind::Sha1),
            "crc32" => Ok(ChecksumKind::Crc32),
            other => Err(Error::UnknownField(other.to_string())),
        }
    }
}

/// A problem reported by [`Store::integrity_check`](crate::storage::Store::integrity_check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    MultipleAlive { path: String, count: i64 },
    MissingBirth { id: i64, path: String },
    OrphanedBlob { id: i64, fileinfo_id: i64 },
    OrphanedLink { id: i64, fileinfo_id: i64 },
    SelfParentDirectory { id: i64, path: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::MultipleAlive { path, count } => {
                write!(f, "{}: {} alive records", path, count)
            }
            Finding::MissingBirth { id, path } => {
                write!(f, "{}: record {} has no birth generation", path, id)
            }
            Finding::OrphanedBlob { id, fileinfo_id } => {
                write!(f, "blobinfo {} references missing fileinfo {}", id, fileinfo_id)
            }
            Finding::OrphanedLink { id, fileinfo_id } => {
                write!(f, "linkinfo {} references missing fileinfo {}", id, fileinfo_id)
            }
            Finding::SelfParentDirectory { id, path } => {
                write!(f, "{}: directory node {} is its own parent", path, id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_kind_bind() {
        assert_eq!(
            ChecksumKind::Crc32.bind("0d4a1185").unwrap(),
            Value::Integer(0x0d4a1185)
        );
        assert_eq!(
            ChecksumKind::Md5
                .bind("5EB63BBBE01EEED093CB22BB8F5ACDC3")
                .unwrap(),
            Value::Text("5eb63bbbe01eeed093cb22bb8f5acdc3".into())
        );
        assert!(ChecksumKind::Sha1.bind("abc").is_err());
        assert!(ChecksumKind::Crc32.bind("zzzzzzzz").is_err());
    }

    #[test]
    fn test_checksum_kind_parse() {
        assert_eq!("SHA1".parse::<ChecksumKind>().unwrap(), ChecksumKind::Sha1);
        assert!("sha256".parse::<ChecksumKind>().is_err());
    }
}
