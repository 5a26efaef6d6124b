use crate::reconcile::ReconcileOptions;
use crate::storage::StoreOptions;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_DATABASE: &str = "scatter.db";

#[derive(Debug, Clone, Deserialize)]
pub struct ScatterConfig {
    pub database: String,
    #[serde(default)]
    pub excludes: Vec<String>,
    pub checksums: bool,
    /// `0` disables the count trigger.
    pub max_insert_count: usize,
    /// `0` disables the byte trigger.
    pub max_insert_bytes: u64,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            database: DEFAULT_DATABASE.to_string(),
            excludes: Vec::new(),
            checksums: true,
            max_insert_count: store.max_insert_count.unwrap_or_default(),
            max_insert_bytes: store.max_insert_bytes.unwrap_or_default(),
        }
    }
}

impl ScatterConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_insert_count: Some(self.max_insert_count).filter(|&n| n > 0),
            max_insert_bytes: Some(self.max_insert_bytes).filter(|&n| n > 0),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            checksums: self.checksums,
            recursive: true,
            excludes: self.excludes.clone(),
        }
    }
}

/// Read `scatter.toml` (or `file` when given) from the working directory if
/// present, then `SCATTER_*` environment variables on top.
pub fn load_configuration(file: Option<&Path>) -> Result<ScatterConfig, ConfigError> {
    let defaults = ScatterConfig::default();
    let mut builder = Config::builder()
        .set_default("database", defaults.database)?
        .set_default("excludes", Vec::<String>::new())?
        .set_default("checksums", defaults.checksums)?
        .set_default("max_insert_count", defaults.max_insert_count as u64)?
        .set_default("max_insert_bytes", defaults.max_insert_bytes)?;

    builder = match file {
        Some(path) => builder.add_source(ConfigFile::from(path)),
        None => builder.add_source(ConfigFile::with_name("scatter").required(false)),
    };

    builder
        .add_source(
            Environment::with_prefix("SCATTER")
                .list_separator(",")
                .with_list_parse_key("excludes")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<ScatterConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories<P: AsRef<Path>>(dirs: Vec<P>) -> Vec<P> {
    let mut result: Vec<P> = Vec::new();

    for dir in dirs {
        let dir_path = dir.as_ref();
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.as_ref().starts_with(dir_path));
        result.push(dir);
    }

    result
}
