use crate::error::{Error, Result};
use crate::record::Record;
use chrono::DateTime;
use std::str::FromStr;

/// A record attribute addressable by name in output templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Type,
    Path,
    Dev,
    Ino,
    Mode,
    Nlink,
    Uid,
    Gid,
    Rdev,
    Size,
    Blksize,
    Blocks,
    Atime,
    Ctime,
    Mtime,
    Time,
    Birth,
    Death,
    Md5,
    Sha1,
    Crc32,
    Target,
}

const FIELDS: &[(&str, Field)] = &[
    ("id", Field::Id),
    ("type", Field::Type),
    ("path", Field::Path),
    ("dev", Field::Dev),
    ("ino", Field::Ino),
    ("mode", Field::Mode),
    ("nlink", Field::Nlink),
    ("uid", Field::Uid),
    ("gid", Field::Gid),
    ("rdev", Field::Rdev),
    ("size", Field::Size),
    ("blksize", Field::Blksize),
    ("blocks", Field::Blocks),
    ("atime", Field::Atime),
    ("ctime", Field::Ctime),
    ("mtime", Field::Mtime),
    ("time", Field::Time),
    ("birth", Field::Birth),
    ("death", Field::Death),
    ("md5", Field::Md5),
    ("sha1", Field::Sha1),
    ("crc32", Field::Crc32),
    ("target", Field::Target),
];

impl Field {
    pub fn all() -> impl Iterator<Item = Field> {
        FIELDS.iter().map(|&(_, field)| field)
    }

    pub fn name(&self) -> &'static str {
        FIELDS
            .iter()
            .find(|(_, field)| field == self)
            .map_or("", |&(name, _)| name)
    }

    /// The attribute rendered as text, `None` when the record lacks it.
    pub fn value(&self, record: &Record) -> Option<String> {
        let int = |v: Option<i64>| v.map(|v| v.to_string());
        let time = |v: Option<i64>| v.map(format_time);
        let blob = record.blob.as_ref();
        match self {
            Field::Id => int(record.id),
            Field::Type => Some(record.kind.to_string()),
            Field::Path => Some(record.path.clone()),
            Field::Dev => int(record.dev),
            Field::Ino => int(record.ino),
            Field::Mode => record.mode.map(|m| format!("{:o}", m)),
            Field::Nlink => int(record.nlink),
            Field::Uid => int(record.uid),
            Field::Gid => int(record.gid),
            Field::Rdev => int(record.rdev),
            Field::Size => int(record.size),
            Field::Blksize => int(record.blksize),
            Field::Blocks => int(record.blocks),
            Field::Atime => time(record.atime),
            Field::Ctime => time(record.ctime),
            Field::Mtime => time(record.mtime),
            Field::Time => time(record.time),
            Field::Birth => int(record.birth),
            Field::Death => int(record.death),
            Field::Md5 => blob.and_then(|b| b.md5.clone()),
            Field::Sha1 => blob.and_then(|b| b.sha1.clone()),
            Field::Crc32 => blob.and_then(|b| b.crc32).map(|c| format!("{:08x}", c)),
            Field::Target => record.target.clone(),
        }
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FIELDS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, field)| field)
            .ok_or_else(|| Error::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Field(Field),
}

/// A parsed output template such as `"{path} {sha1}"`. Field names are
/// resolved once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                pieces.push(Piece::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| Error::UnknownField(after.to_string()))?;
            pieces.push(Piece::Field(after[..close].trim().parse()?));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_string()));
        }
        Ok(Self { pieces })
    }

    /// Missing attributes render as `-`.
    pub fn render(&self, record: &Record) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Field(field) => {
                    out.push_str(field.value(record).as_deref().unwrap_or("-"))
                }
            }
        }
        out
    }
}

pub fn render_template(template: &str, record: &Record) -> Result<String> {
    Ok(Template::parse(template)?.render(record))
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// ns since the epoch as a UTC timestamp.
pub fn format_time(nanos: i64) -> String {
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| nanos.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::record::FileKind;

    fn sample() -> Record {
        let mut record = Record::new("/d/a.txt", FileKind::File);
        record.size = Some(11);
        record.mode = Some(0o100644);
        record.mtime = Some(1_700_000_000_000_000_000);
        let mut blob = Fingerprint::new(11);
        blob.sha1 = Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".into());
        blob.crc32 = Some(0x0d4a1185);
        record.blob = Some(blob);
        record
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::all() {
            assert_eq!(field.name().parse::<Field>().unwrap(), field);
        }
        assert!(matches!("nope".parse::<Field>(), Err(Error::UnknownField(_))));
    }

    #[test]
    fn test_render_template() {
        let record = sample();
        assert_eq!(
            render_template("{path} {size} {crc32} {md5}", &record).unwrap(),
            "/d/a.txt 11 0d4a1185 -"
        );
        assert_eq!(render_template("{mode}", &record).unwrap(), "100644");
        assert_eq!(
            render_template("{mtime}", &record).unwrap(),
            "2023-11-14 22:13:20"
        );
        assert!(render_template("{bogus}", &record).is_err());
        assert!(render_template("{path", &record).is_err());
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
