pub mod fsck;
pub mod models;
pub mod queries;
pub mod sqlite;
pub mod stream;
pub mod writes;

pub use models::{ChecksumKind, DirectoryNode, Finding};
pub use queries::case_insensitive_glob;
pub use sqlite::{Store, StoreOptions};
pub use stream::{DuplicateGroups, RecordStream};
