use rusqlite::params;
use scatter_core::generation::{GenerationRange, IncludeRule};
use scatter_core::record::{FileKind, Record};
use scatter_core::snapshot::{write_snapshot, SnapshotReader};
use scatter_core::storage::{ChecksumKind, Finding, Store, StoreOptions};
use scatter_core::{Error, Fingerprint};

fn open() -> Store {
    Store::open_in_memory(StoreOptions::default()).unwrap()
}

fn file_record(path: &str, sha1: &str, size: u64) -> Record {
    let mut record = Record::new(path, FileKind::File);
    record.size = Some(size as i64);
    record.mtime = Some(1_700_000_000_000_000_000);
    let mut blob = Fingerprint::new(size);
    blob.sha1 = Some(sha1.to_string());
    record.blob = Some(blob);
    record
}

fn dir_record(path: &str) -> Record {
    Record::new(path, FileKind::Directory)
}

fn alive(store: &Store, path: &str) -> Option<Record> {
    store.find_one_by_path(path).unwrap()
}

const SHA_X: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const SHA_Y: &str = "0a4d55a8d778e5022fab701977c5d840bbc486d0";

#[test]
fn test_upsert_and_find_by_path() {
    let mut store = open();
    let generation = store.begin_generation("test").unwrap();
    let id = store.upsert(&file_record("/d/a.txt", SHA_X, 11)).unwrap();
    store.commit().unwrap();

    let found: Vec<Record> = store
        .find_by_path("/d/a.txt", None)
        .collect::<scatter_core::Result<_>>()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, Some(id));
    assert_eq!(found[0].birth, Some(generation));
    assert!(found[0].is_alive());
    assert_eq!(found[0].blob.as_ref().unwrap().sha1.as_deref(), Some(SHA_X));

    assert!(store.find_by_path("/d/missing", None).next().is_none());
}

#[test]
fn test_upsert_without_generation_fails() {
    let mut store = open();
    let result = store.upsert(&file_record("/d/a.txt", SHA_X, 11));
    assert!(matches!(result, Err(Error::NoGeneration)));
}

#[test]
fn test_directory_tree_parent_property() {
    let mut store = open();
    store.begin_generation("test").unwrap();
    store.upsert(&file_record("/a/b/c/d.txt", SHA_X, 1)).unwrap();
    store.upsert(&file_record("/a/e/f.txt", SHA_Y, 1)).unwrap();
    store.commit().unwrap();

    let mut stmt = store
        .connection()
        .prepare(
            "SELECT d.path, p.path FROM directory d \
             LEFT JOIN directory p ON p.id = d.parent_id ORDER BY d.path",
        )
        .unwrap();
    let rows: Vec<(String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    let paths: Vec<&str> = rows.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!["/", "/a", "/a/b", "/a/b/c", "/a/e"]);
    for (path, parent) in &rows {
        let expected = scatter_core::record::parent_of(path);
        assert_eq!(parent, &expected, "parent of {}", path);
    }
}

#[test]
fn test_missing_parent_link_is_backfilled() {
    let mut store = open();
    store
        .connection()
        .execute(
            "INSERT INTO directory (path, parent_id) VALUES ('/a/b', NULL)",
            [],
        )
        .unwrap();

    store.begin_generation("test").unwrap();
    store.upsert(&file_record("/a/b/c/x", SHA_X, 1)).unwrap();
    store.commit().unwrap();

    let parent: Option<String> = store
        .connection()
        .query_row(
            "SELECT p.path FROM directory d JOIN directory p ON p.id = d.parent_id \
             WHERE d.path = '/a/b'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(parent.as_deref(), Some("/a"));
}

#[test]
fn test_retire_and_range_queries() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/d/a.txt", SHA_X, 11)).unwrap();
    store.commit().unwrap();

    store.begin_generation("second").unwrap();
    let record = alive(&store, "/d/a.txt").unwrap();
    assert_eq!(store.retire(&record).unwrap(), 1);
    // Already dead: nothing left to retire.
    assert_eq!(store.retire(&record).unwrap(), 0);
    store.commit().unwrap();

    assert!(alive(&store, "/d/a.txt").is_none());

    let changed = GenerationRange::changed_in(2);
    let versions: Vec<Record> = store
        .find_by_path("/d/a.txt", Some(&changed))
        .collect::<scatter_core::Result<_>>()
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].death, Some(2));

    let alive_in_first = GenerationRange::new(Some(1), Some(2));
    assert_eq!(
        store.find_by_path("/d/a.txt", Some(&alive_in_first)).count(),
        1
    );
    let alive_later = GenerationRange::new(Some(3), None);
    assert_eq!(store.find_by_path("/d/a.txt", Some(&alive_later)).count(), 0);
}

#[test]
fn test_versions_ordered_by_birth() {
    let mut store = open();
    for generation in 1..=3 {
        store.begin_generation("run").unwrap();
        if let Some(old) = alive(&store, "/d/a.txt") {
            store.retire(&old).unwrap();
        }
        store
            .upsert(&file_record("/d/a.txt", SHA_X, generation))
            .unwrap();
        store.commit().unwrap();
    }

    let births: Vec<Option<i64>> = store
        .find_by_path("/d/a.txt", Some(&GenerationRange::ALL))
        .map(|r| r.unwrap().birth)
        .collect();
    assert_eq!(births, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_retire_recursive_retires_subtree() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&dir_record("/t")).unwrap();
    store.upsert(&file_record("/t/x", SHA_X, 1)).unwrap();
    store.upsert(&dir_record("/t/s")).unwrap();
    store.upsert(&file_record("/t/s/y", SHA_Y, 1)).unwrap();
    store.upsert(&file_record("/other", SHA_Y, 1)).unwrap();
    store.commit().unwrap();

    store.begin_generation("second").unwrap();
    let top = alive(&store, "/t").unwrap();
    assert_eq!(store.retire_recursive(&top).unwrap(), 4);
    store.commit().unwrap();

    for path in ["/t", "/t/x", "/t/s", "/t/s/y"] {
        assert!(alive(&store, path).is_none(), "{} still alive", path);
    }
    assert!(alive(&store, "/other").is_some());
}

#[test]
fn test_retire_recursive_on_file_retires_only_the_file() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/t/x", SHA_X, 1)).unwrap();
    store.upsert(&file_record("/t/y", SHA_Y, 1)).unwrap();
    store.commit().unwrap();

    let file = alive(&store, "/t/x").unwrap();
    assert_eq!(store.retire_recursive(&file).unwrap(), 1);
    assert!(alive(&store, "/t/x").is_none());
    assert!(alive(&store, "/t/y").is_some());
}

#[test]
fn test_remove_path_requires_recursive_for_directories() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&dir_record("/t")).unwrap();
    store.upsert(&file_record("/t/x", SHA_X, 1)).unwrap();
    store.commit().unwrap();

    let result = store.remove_path("/t", false);
    assert!(matches!(result, Err(Error::DirectoryNeedsRecursive(_))));
    assert!(alive(&store, "/t").is_some());
    assert!(alive(&store, "/t/x").is_some());

    assert_eq!(store.remove_path("/t", true).unwrap(), 2);
    assert!(alive(&store, "/t/x").is_none());
    assert_eq!(store.remove_path("/nowhere", false).unwrap(), 0);
}

#[test]
fn test_find_in_directory_lists_alive_children() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/d/b", SHA_X, 1)).unwrap();
    store.upsert(&file_record("/d/a", SHA_X, 1)).unwrap();
    store.upsert(&file_record("/d/sub/deep", SHA_X, 1)).unwrap();
    store.upsert(&dir_record("/d/sub")).unwrap();
    let gone = store.upsert(&file_record("/d/c", SHA_X, 1)).unwrap();
    store.commit().unwrap();

    let c = alive(&store, "/d/c").unwrap();
    assert_eq!(c.id, Some(gone));
    store.retire(&c).unwrap();

    let children: Vec<String> = store
        .find_in_directory("/d")
        .unwrap()
        .map(|r| r.unwrap().path)
        .collect();
    assert_eq!(children, vec!["/d/a", "/d/b", "/d/sub"]);
    assert_eq!(store.find_in_directory("/nope").unwrap().count(), 0);
}

#[test]
fn test_find_by_glob_and_checksum() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    let mut photo = file_record("/p/IMG_1.JPG", SHA_X, 5);
    if let Some(blob) = photo.blob.as_mut() {
        blob.md5 = Some("5eb63bbbe01eeed093cb22bb8f5acdc3".into());
        blob.crc32 = Some(0x0d4a1185);
    }
    store.upsert(&photo).unwrap();
    store.upsert(&file_record("/p/notes.txt", SHA_Y, 5)).unwrap();
    store.upsert(&file_record("/q/readme.txt", SHA_Y, 5)).unwrap();
    store.commit().unwrap();

    let txt: Vec<String> = store
        .find_by_glob(&["/p/*.txt".to_string(), "/q/*".to_string()], None)
        .map(|r| r.unwrap().path)
        .collect();
    assert_eq!(txt, vec!["/p/notes.txt", "/q/readme.txt"]);

    let folded = scatter_core::storage::case_insensitive_glob("*.jpg");
    assert_eq!(store.find_by_glob(&[folded], None).count(), 1);
    assert_eq!(store.find_by_glob(&["*.jpg".to_string()], None).count(), 0);

    for (kind, digest) in [
        (ChecksumKind::Sha1, SHA_X),
        (ChecksumKind::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3"),
        (ChecksumKind::Crc32, "0d4a1185"),
    ] {
        let hits: Vec<String> = store
            .find_by_checksum(kind, digest, None)
            .unwrap()
            .map(|r| r.unwrap().path)
            .collect();
        assert_eq!(hits, vec!["/p/IMG_1.JPG"], "{:?}", kind);
    }
    assert!(matches!(
        store.find_by_checksum(ChecksumKind::Sha1, "xyz", None),
        Err(Error::InvalidDigest { .. })
    ));
}

#[test]
fn test_find_duplicates_under_prefix() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/d/a.txt", SHA_X, 11)).unwrap();
    store.upsert(&file_record("/d/sub/b.txt", SHA_X, 11)).unwrap();
    store.upsert(&file_record("/d/unique", SHA_Y, 3)).unwrap();
    store.upsert(&file_record("/e/y1", SHA_Y, 3)).unwrap();
    store.upsert(&file_record("/dx/a.txt", SHA_X, 11)).unwrap();
    store.commit().unwrap();

    let groups: Vec<Vec<Record>> = store
        .find_duplicates("/d")
        .collect::<scatter_core::Result<_>>()
        .unwrap();
    assert_eq!(groups.len(), 1);
    let mut paths: Vec<&str> = groups[0].iter().map(|r| r.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/d/a.txt", "/d/sub/b.txt"]);

    let everywhere: Vec<Vec<Record>> = store
        .find_duplicates("/")
        .collect::<scatter_core::Result<_>>()
        .unwrap();
    assert_eq!(everywhere.len(), 2);
    for group in &everywhere {
        assert!(group.len() >= 2);
        let sha1 = group[0].blob.as_ref().unwrap().sha1.clone();
        assert!(group.iter().all(|r| r.blob.as_ref().unwrap().sha1 == sha1));
    }
    // ordered by digest
    assert_eq!(everywhere[0][0].blob.as_ref().unwrap().sha1.as_deref(), Some(SHA_Y));
}

#[test]
fn test_streams_are_independent() {
    let mut store = open();
    store.begin_generation("bulk").unwrap();
    for i in 0..1200 {
        store
            .upsert(&file_record(&format!("/bulk/f{:05}", i), SHA_X, 1))
            .unwrap();
    }
    store.commit().unwrap();

    let mut first = store.find_all(None);
    let mut second = store.find_by_glob(&["/bulk/*".to_string()], None);
    let mut seen = (0, 0);
    loop {
        let a = first.next().map(|r| r.unwrap());
        let b = second.next().map(|r| r.unwrap());
        if let (Some(a), Some(b)) = (&a, &b) {
            assert_eq!(a.path, b.path);
        }
        seen.0 += a.is_some() as usize;
        seen.1 += b.is_some() as usize;
        if a.is_none() && b.is_none() {
            break;
        }
    }
    // 1200 files; the directory nodes are not records
    assert_eq!(seen, (1200, 1200));
}

#[test]
fn test_auto_commit_after_insert_count() {
    let options = StoreOptions {
        max_insert_count: Some(2),
        max_insert_bytes: None,
    };
    let mut store = Store::open_in_memory(options).unwrap();
    store.begin_generation("test").unwrap();
    store.upsert(&file_record("/a", SHA_X, 1)).unwrap();
    assert!(store.has_pending_writes());
    store.upsert(&file_record("/b", SHA_X, 1)).unwrap();
    assert!(!store.has_pending_writes());
}

#[test]
fn test_auto_commit_after_fingerprinted_bytes() {
    let options = StoreOptions {
        max_insert_count: None,
        max_insert_bytes: Some(1000),
    };
    let mut store = Store::open_in_memory(options).unwrap();
    store.begin_generation("test").unwrap();
    store.upsert(&file_record("/small", SHA_X, 10)).unwrap();
    assert!(store.has_pending_writes());
    store.upsert(&file_record("/big", SHA_Y, 5000)).unwrap();
    assert!(!store.has_pending_writes());
}

#[test]
fn test_generations_and_span() {
    let mut store = open();
    assert_eq!(
        store.generation_span().unwrap(),
        GenerationRange::new(Some(0), Some(0))
    );

    for command in ["one", "two", "three"] {
        let id = store.begin_generation(command).unwrap();
        store.end_generation(id).unwrap();
    }
    let span = store.generation_span().unwrap();
    assert_eq!(span, GenerationRange::new(Some(1), Some(4)));

    let last = GenerationRange::parse_within("-1", &span).unwrap();
    assert_eq!((last.start, last.end), (Some(3), Some(4)));
    let all = GenerationRange::parse_within("", &span).unwrap();
    assert_eq!((all.start, all.end), (Some(1), Some(4)));
    assert_eq!(all.rule, IncludeRule::Alive);

    let listed = store
        .generations(&GenerationRange::new(Some(2), None))
        .unwrap();
    let commands: Vec<&str> = listed.iter().map(|g| g.command.as_str()).collect();
    assert_eq!(commands, vec!["two", "three"]);
    assert!(listed.iter().all(|g| !g.is_open()));
    assert!(store.generation(9).unwrap().is_none());
}

#[test]
fn test_integrity_check_and_cleanup() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/d/a", SHA_X, 1)).unwrap();
    let newest = store.upsert(&file_record("/d/a", SHA_Y, 2)).unwrap();
    store.upsert(&file_record("/d/b", SHA_Y, 2)).unwrap();
    store.commit().unwrap();

    store
        .connection()
        .execute(
            "INSERT INTO fileinfo (type, path, birth) VALUES ('file', '/d/nobirth', NULL)",
            [],
        )
        .unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO blobinfo (fileinfo_id, size, sha1) VALUES (9999, 1, ?1)",
            params![SHA_X],
        )
        .unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO linkinfo (fileinfo_id, target) VALUES (9998, 'x')",
            [],
        )
        .unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO directory (id, path, parent_id) VALUES (500, '/loop', 500)",
            [],
        )
        .unwrap();

    let findings = store.integrity_check().unwrap();
    assert!(findings.contains(&Finding::MultipleAlive {
        path: "/d/a".into(),
        count: 2
    }));
    assert!(findings
        .iter()
        .any(|f| matches!(f, Finding::MissingBirth { path, .. } if path == "/d/nobirth")));
    assert!(findings
        .iter()
        .any(|f| matches!(f, Finding::OrphanedBlob { fileinfo_id: 9999, .. })));
    assert!(findings
        .iter()
        .any(|f| matches!(f, Finding::OrphanedLink { fileinfo_id: 9998, .. })));
    assert!(findings.contains(&Finding::SelfParentDirectory {
        id: 500,
        path: "/loop".into()
    }));

    assert_eq!(store.cleanup_double_alive().unwrap(), 1);
    assert_eq!(alive(&store, "/d/a").unwrap().id, Some(newest));
    let after = store.integrity_check().unwrap();
    assert!(!after
        .iter()
        .any(|f| matches!(f, Finding::MultipleAlive { .. })));
}

#[test]
fn test_maintenance_rebuilds() {
    let mut store = open();
    store.begin_generation("first").unwrap();
    store.upsert(&file_record("/d/a", SHA_X, 1)).unwrap();
    store.upsert(&file_record("/d/e/b", SHA_X, 1)).unwrap();
    store.commit().unwrap();

    assert_eq!(store.rebuild_directory_table().unwrap(), 2);
    let children: Vec<String> = store
        .find_in_directory("/d")
        .unwrap()
        .map(|r| r.unwrap().path)
        .collect();
    assert_eq!(children, vec!["/d/a"]);

    store.rebuild_indices().unwrap();
    let indices: i64 = store
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE '%_index'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indices, 10);

    store.vacuum().unwrap();
    assert_eq!(store.find_all(None).count(), 2);
}

#[test]
fn test_import_snapshot() {
    let mut link = Record::new("/d/c.lnk", FileKind::Link);
    link.target = Some("a.txt".into());
    let records = vec![file_record("/d/a.txt", SHA_X, 11), link];

    let mut buffer = Vec::new();
    write_snapshot(&mut buffer, records.iter().cloned().map(Ok)).unwrap();

    let mut store = open();
    let generation = store.begin_generation("import").unwrap();
    let count = store.import_snapshot(SnapshotReader::new(&buffer[..])).unwrap();
    assert_eq!(count, 2);

    for original in &records {
        let stored = alive(&store, &original.path).unwrap();
        assert!(stored.same_attributes(original));
        assert_eq!(stored.birth, Some(generation));
    }
}

#[test]
fn test_import_snapshot_twice_keeps_one_alive_record() {
    let mut buffer = Vec::new();
    write_snapshot(&mut buffer, vec![Ok(file_record("/d/a.txt", SHA_X, 11))]).unwrap();

    let mut store = open();
    store.begin_generation("first import").unwrap();
    assert_eq!(store.import_snapshot(SnapshotReader::new(&buffer[..])).unwrap(), 1);
    store.begin_generation("second import").unwrap();
    assert_eq!(store.import_snapshot(SnapshotReader::new(&buffer[..])).unwrap(), 0);

    let versions: Vec<Record> = store
        .find_by_path("/d/a.txt", Some(&GenerationRange::ALL))
        .collect::<scatter_core::Result<_>>()
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert!(store.integrity_check().unwrap().is_empty());

    // A changed line replaces the alive version.
    let mut changed = Vec::new();
    write_snapshot(&mut changed, vec![Ok(file_record("/d/a.txt", SHA_Y, 12))]).unwrap();
    let third = store.begin_generation("third import").unwrap();
    assert_eq!(store.import_snapshot(SnapshotReader::new(&changed[..])).unwrap(), 1);

    let current = alive(&store, "/d/a.txt").unwrap();
    assert_eq!(current.birth, Some(third));
    assert_eq!(current.size, Some(12));
    assert!(store.integrity_check().unwrap().is_empty());
}
