use crate::error::Result;
use crate::record::Record;
use crate::storage::Store;
use tracing::info;

/// What the reconciler needs from a store: reads of the alive state and the
/// writes that change it.
pub trait Catalog {
    /// The alive record at `path`.
    fn lookup(&self, path: &str) -> Result<Option<Record>>;

    /// Alive direct children of the directory at `path`, sorted by path.
    fn children(&self, path: &str) -> Result<Vec<Record>>;

    fn store(&mut self, record: &Record) -> Result<()>;

    /// Returns the number of records retired, 0 if it was already dead.
    fn retire(&mut self, record: &Record) -> Result<usize>;

    /// Returns the number of records retired.
    fn retire_recursive(&mut self, record: &Record) -> Result<usize>;

    fn commit(&mut self) -> Result<()>;
}

impl Catalog for Store {
    fn lookup(&self, path: &str) -> Result<Option<Record>> {
        self.find_one_by_path(path)
    }

    fn children(&self, path: &str) -> Result<Vec<Record>> {
        self.find_in_directory(path)?.collect()
    }

    fn store(&mut self, record: &Record) -> Result<()> {
        self.upsert(record).map(|_| ())
    }

    fn retire(&mut self, record: &Record) -> Result<usize> {
        Store::retire(self, record)
    }

    fn retire_recursive(&mut self, record: &Record) -> Result<usize> {
        Store::retire_recursive(self, record)
    }

    fn commit(&mut self) -> Result<()> {
        Store::commit(self)
    }
}

/// Logs every mutation instead of performing it. Reads come from `store`
/// when one is given, so a dry run against an existing store shows exactly
/// what a real run would change.
pub struct DryRun<'a> {
    store: Option<&'a Store>,
}

impl<'a> DryRun<'a> {
    pub fn new(store: Option<&'a Store>) -> Self {
        Self { store }
    }
}

impl Catalog for DryRun<'_> {
    fn lookup(&self, path: &str) -> Result<Option<Record>> {
        match self.store {
            Some(store) => store.find_one_by_path(path),
            None => Ok(None),
        }
    }

    fn children(&self, path: &str) -> Result<Vec<Record>> {
        match self.store {
            Some(store) => store.find_in_directory(path)?.collect(),
            None => Ok(Vec::new()),
        }
    }

    fn store(&mut self, record: &Record) -> Result<()> {
        info!("[dry run] store {} ({})", record.path, record.kind);
        Ok(())
    }

    fn retire(&mut self, record: &Record) -> Result<usize> {
        info!("[dry run] retire {}", record.path);
        Ok(1)
    }

    fn retire_recursive(&mut self, record: &Record) -> Result<usize> {
        info!("[dry run] retire {} recursively", record.path);
        Ok(1)
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileKind;
    use crate::storage::StoreOptions;

    #[test]
    fn test_dry_run_does_not_write() {
        let mut store = Store::open_in_memory(StoreOptions::default()).unwrap();
        store.begin_generation("test").unwrap();
        store.upsert(&Record::new("/d/a.txt", FileKind::File)).unwrap();
        store.commit().unwrap();

        let mut dry = DryRun::new(Some(&store));
        let existing = dry.lookup("/d/a.txt").unwrap().unwrap();
        dry.retire(&existing).unwrap();
        dry.store(&Record::new("/d/b.txt", FileKind::File)).unwrap();
        assert_eq!(dry.children("/d").unwrap().len(), 1);

        assert!(store.find_one_by_path("/d/a.txt").unwrap().is_some());
        assert!(store.find_one_by_path("/d/b.txt").unwrap().is_none());
    }

    #[test]
    fn test_dry_run_without_store_sees_nothing() {
        let dry = DryRun::new(None);
        assert!(dry.lookup("/anything").unwrap().is_none());
        assert!(dry.children("/").unwrap().is_empty());
    }
}
