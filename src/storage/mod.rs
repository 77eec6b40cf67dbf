//! Storage layer for Groundchat
//!
//! Owns the data directory and the session database inside it.

pub mod database;

use crate::error::{GroundchatError, Result};
use std::path::{Path, PathBuf};

pub use database::{Database, DbPool};

const DATABASE_FILE: &str = "groundchat.sqlite";

/// Storage manager rooted at the configured data directory
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;

        let database = Database::new(&base_path.join(DATABASE_FILE))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_path.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("nested").join("data");
        let storage = StorageManager::new(base.clone()).unwrap();

        assert!(base.exists());
        assert!(storage.database_path().exists());
        assert_eq!(storage.base_path(), base.as_path());
    }
}
