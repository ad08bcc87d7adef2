// Process configuration
//
// Defaults, then an optional TOML file, then HBNB_* environment overrides.

use crate::error::{StoreError, StoreResult};
use crate::search::SearchMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which backend adapter the registry opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Db,
}

impl std::str::FromStr for StorageKind {
    type Err = StoreError;

    fn from_str(value: &str) -> StoreResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "db" => Ok(StorageKind::Db),
            other => Err(StoreError::config(format!("unknown storage type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageKind,
    pub file_path: PathBuf,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Reproduce the amenity-only search quirk (see search.rs)
    pub search_compat: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::File,
            file_path: PathBuf::from("file.json"),
            db_path: PathBuf::from("hbnb.db"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            search_compat: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        toml::from_str(raw).map_err(|e| StoreError::config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Load from `HBNB_CONFIG` (if set) and the process environment
    pub fn load() -> StoreResult<Self> {
        let mut config = match std::env::var("HBNB_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply HBNB_* overrides from `lookup` (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> StoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(storage) = lookup("HBNB_TYPE_STORAGE") {
            self.storage = storage.parse()?;
        }
        if let Some(path) = lookup("HBNB_FILE_PATH") {
            self.file_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("HBNB_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("HBNB_API_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("HBNB_API_PORT") {
            self.port = port
                .parse()
                .map_err(|_| StoreError::config(format!("invalid HBNB_API_PORT: {}", port)))?;
        }
        if let Some(flag) = lookup("HBNB_SEARCH_COMPAT") {
            self.search_compat = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn search_mode(&self) -> SearchMode {
        if self.search_compat {
            SearchMode::Compatibility
        } else {
            SearchMode::Corrected
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
