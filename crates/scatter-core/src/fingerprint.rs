use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Content identity of a file: byte count plus whichever digests are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub crc32: Option<u32>,
}

impl Fingerprint {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            md5: None,
            sha1: None,
            crc32: None,
        }
    }

    /// Read the file once, feeding crc32, md5 and sha1 from the same buffer.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        Self::from_reader(&mut file)
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut size = 0u64;
        let mut crc = crc32fast::Hasher::new();
        let mut md5 = md5::Context::new();
        let mut sha1 = Sha1::new();

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buffer[..n];
            size += n as u64;
            crc.update(chunk);
            md5.consume(chunk);
            sha1.update(chunk);
        }

        Ok(Self {
            size,
            md5: Some(format!("{:x}", md5.compute())),
            sha1: Some(format!("{:x}", sha1.finalize())),
            crc32: Some(crc.finalize()),
        })
    }

    /// Both cryptographic digests are present, so the fingerprint may be
    /// recycled instead of re-reading the file.
    pub fn is_complete(&self) -> bool {
        self.md5.is_some() && self.sha1.is_some()
    }

    /// Opportunistic content match: same size and at least one digest that
    /// both sides carry is equal. Not transitive.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        fn same<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a == b)
        }

        self.size == other.size
            && (same(&self.sha1, &other.sha1)
                || same(&self.md5, &other.md5)
                || same(&self.crc32, &other.crc32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_reader_known_digests() {
        let fp = Fingerprint::from_reader(&mut Cursor::new(b"hello world")).unwrap();
        assert_eq!(fp.size, 11);
        assert_eq!(fp.md5.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert_eq!(
            fp.sha1.as_deref(),
            Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed")
        );
        assert_eq!(fp.crc32, Some(0x0d4a_1185));
        assert!(fp.is_complete());
    }

    #[test]
    fn test_from_reader_spans_chunks() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        let fp = Fingerprint::from_reader(&mut Cursor::new(&data)).unwrap();
        assert_eq!(fp.size, data.len() as u64);
        let again = Fingerprint::from_reader(&mut Cursor::new(&data)).unwrap();
        assert_eq!(fp, again);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Fingerprint::from_file(Path::new("/nonexistent/scatter/file")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_matches_requires_size() {
        let mut a = Fingerprint::new(10);
        a.sha1 = Some("aa".into());
        let mut b = Fingerprint::new(11);
        b.sha1 = Some("aa".into());
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_matches_is_symmetric_but_not_transitive() {
        let mut a = Fingerprint::new(5);
        a.sha1 = Some("s1".into());

        let mut b = Fingerprint::new(5);
        b.sha1 = Some("s1".into());
        b.md5 = Some("m1".into());

        let mut c = Fingerprint::new(5);
        c.md5 = Some("m1".into());

        assert!(a.matches(&a));
        assert!(a.matches(&b) && b.matches(&a));
        assert!(b.matches(&c) && c.matches(&b));
        assert!(!a.matches(&c));
        assert!(!c.matches(&a));
    }

    #[test]
    fn test_no_shared_digest_is_not_a_match() {
        let a = Fingerprint::new(0);
        let b = Fingerprint::new(0);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_is_complete() {
        let mut fp = Fingerprint::new(1);
        fp.sha1 = Some("x".into());
        assert!(!fp.is_complete());
        fp.md5 = Some("y".into());
        assert!(fp.is_complete());
    }
}
