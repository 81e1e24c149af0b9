//! On-disk gib store
//!
//! Ties a [`DiskStore`] to its [`Config`] and exposes the user-level
//! operations. Opening requires an initialized store; `init` creates one.

use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{self, DeleteOutcome};
use crate::config::{CONFIG_FILE, Config};
use crate::disk_store::DiskStore;
use crate::error::{GibError, Result};
use crate::extract::{self, Extraction};
use crate::snapshot::{self, SnapshotOutcome};
use crate::source::SourceFilter;

/// Default store directory, relative to the working directory
pub const DEFAULT_STORE_DIR: &str = ".gib";

pub struct Repository {
    root: PathBuf,
    uuid: String,
    config: Config,
    store: DiskStore,
}

impl Repository {
    /// Whether `root` holds an initialized store
    pub fn is_initialized(root: &Path) -> bool {
        root.join(CONFIG_FILE).is_file()
    }

    /// Create a store at `root`. Re-running on an existing store keeps its
    /// config and UUID.
    pub fn init(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;

        let config = if Self::is_initialized(root) {
            Config::load(root)?
        } else {
            let config = Config::default();
            config.save(root)?;
            config
        };

        let uuid_path = root.join("uuid");
        if !uuid_path.exists() {
            fs::write(&uuid_path, uuid::Uuid::new_v4().to_string())?;
        }

        let store = DiskStore::open(root, config.compression_level)?;
        tracing::debug!("Initialized gib store at {:?}", root);
        Self::from_parts(root, config, store)
    }

    /// Open an existing store
    pub fn open(root: &Path) -> Result<Self> {
        if !Self::is_initialized(root) {
            return Err(GibError::NotInitialized(root.to_path_buf()));
        }
        let config = Config::load(root)?;
        let store = DiskStore::open(root, config.compression_level)?;
        Self::from_parts(root, config, store)
    }

    fn from_parts(root: &Path, config: Config, store: DiskStore) -> Result<Self> {
        let uuid = fs::read_to_string(root.join("uuid"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        Ok(Self {
            root: root.to_path_buf(),
            uuid,
            config,
            store,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get repository UUID
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DiskStore {
        &self.store
    }

    /// Snapshot `paths` into `backup`, named after the current local time
    pub fn snapshot(&self, backup: &str, paths: &[PathBuf]) -> Result<SnapshotOutcome> {
        self.snapshot_at(backup, paths, Local::now().naive_local())
    }

    pub fn snapshot_at(
        &self,
        backup: &str,
        paths: &[PathBuf],
        now: NaiveDateTime,
    ) -> Result<SnapshotOutcome> {
        // The store may live inside a directory being backed up
        let filter = SourceFilter::new().exclude(&self.root);
        snapshot::snapshot(&self.store, &self.config, backup, paths, &filter, now)
    }

    pub fn list(&self, backup: Option<&str>) -> Result<Vec<String>> {
        catalog::list(&self.store, &self.config, backup)
    }

    pub fn extract(&self, backup: &str, snapshot: &str, dest: &Path) -> Result<Extraction> {
        extract::extract(&self.store, &self.config, backup, snapshot, dest)
    }

    pub fn delete(&self, backup: &str, snapshot: &str) -> Result<DeleteOutcome> {
        catalog::delete(&self.store, &self.config, backup, snapshot)
    }
}
