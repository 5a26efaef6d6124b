use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid generation range: {0}")]
    InvalidRange(String),

    #[error("malformed row in store: {0}")]
    MalformedRow(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid {kind} digest: {digest}")]
    InvalidDigest { kind: &'static str, digest: String },

    #[error("{0}: record is not stored")]
    NotStored(String),

    #[error("{0}: is a directory, recursive removal required")]
    DirectoryNeedsRecursive(String),

    #[error("no open generation")]
    NoGeneration,

    #[error("interrupted")]
    Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
