//! Disk-persistent object store
//!
//! Objects live in a content-addressed directory (like git's loose objects),
//! refs are plain files under `refs/`, and the stage area is a sled embedded
//! database so that staging large directories stays O(log n) per entry.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::object::{ObjectId, ObjectKind, is_valid_entry_name};
use crate::storage::{ObjectStore, Result, StagedEntry, StorageError, validate_stage_path};

/// Disk-persistent object store
///
/// Layout on disk:
/// ```text
/// {root}/
///   objects/{hash[0..2]}/{hash[2..]}  zstd-compressed, tag byte + payload
///   refs/...                          one file per ref, "<hex>\n"
///   index.db/                         sled database holding the stage area
/// ```
pub struct DiskStore {
    root: PathBuf,
    /// The stage area: staged path -> bincode(StagedEntry)
    stage_db: sled::Db,
    compression_level: i32,
}

impl DiskStore {
    /// Open (creating directories if needed) a store at `root`
    pub fn open(root: &Path, compression_level: i32) -> Result<Self> {
        let root = root.to_path_buf();

        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("refs"))?;

        let stage_db = sled::open(root.join("index.db")).map_err(|e| {
            StorageError::Database(format!(
                "Failed to open sled database at {:?}: {}",
                root.join("index.db"),
                e
            ))
        })?;

        Ok(Self {
            root,
            stage_db,
            compression_level,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ==================== Object Store ====================

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    // ==================== Refs ====================

    fn refs_root(&self) -> PathBuf {
        self.root.join("refs")
    }

    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        let rest = name
            .strip_prefix("refs/")
            .ok_or_else(|| StorageError::InvalidPath(name.to_string()))?;
        if !rest.split('/').all(is_valid_entry_name) || name.ends_with(".lock") {
            return Err(StorageError::InvalidPath(name.to_string()));
        }
        Ok(rest
            .split('/')
            .fold(self.refs_root(), |acc, part| acc.join(part)))
    }

    /// Remove now-empty directories between a deleted ref and `refs/`
    fn prune_empty_ref_dirs(&self, from: &Path) {
        let refs_root = self.refs_root();
        let mut dir = from.parent();
        while let Some(current) = dir {
            if current == refs_root || !current.starts_with(&refs_root) {
                break;
            }
            let is_empty = fs::read_dir(current)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn db_err(e: sled::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

impl ObjectStore for DiskStore {
    fn put_object(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_object(kind, payload);
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id); // Already stored (content-addressed = idempotent)
        }

        let mut raw = Vec::with_capacity(payload.len() + 1);
        raw.push(kind.tag());
        raw.extend_from_slice(payload);
        let compressed = zstd::encode_all(&raw[..], self.compression_level)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write atomically via temp file
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &compressed)?;
        fs::rename(&tmp_path, &path)?;
        Ok(id)
    }

    fn get_object(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        let path = self.object_path(&id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        let raw = zstd::decode_all(&compressed[..])
            .map_err(|e| StorageError::Corrupt(id, format!("zstd: {}", e)))?;

        let (&tag, payload) = raw
            .split_first()
            .ok_or_else(|| StorageError::Corrupt(id, "empty object file".to_string()))?;
        let kind = ObjectKind::from_tag(tag)
            .ok_or_else(|| StorageError::Corrupt(id, format!("unknown object tag {:#04x}", tag)))?;
        if ObjectId::for_object(kind, payload) != id {
            return Err(StorageError::Corrupt(id, "hash mismatch".to_string()));
        }
        Ok((kind, payload.to_vec()))
    }

    fn stage_entry(&self, path: &str, entry: StagedEntry) -> Result<()> {
        validate_stage_path(path)?;
        let value = bincode::serialize(&entry)?;
        self.stage_db.insert(path.as_bytes(), value).map_err(db_err)?;
        Ok(())
    }

    fn staged_entries(&self) -> Result<Vec<(String, StagedEntry)>> {
        let mut entries = Vec::new();
        for item in self.stage_db.iter() {
            let (key, value) = item.map_err(db_err)?;
            let path = String::from_utf8(key.to_vec())
                .map_err(|e| StorageError::Serialization(format!("Invalid UTF-8 in stage key: {}", e)))?;
            let entry: StagedEntry = bincode::deserialize(&value)?;
            entries.push((path, entry));
        }
        Ok(entries)
    }

    fn clear_stage(&self) -> Result<()> {
        self.stage_db.clear().map_err(db_err)
    }

    fn put_ref(&self, name: &str, id: ObjectId) -> Result<()> {
        let path = self.ref_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = lock_path(&path);
        fs::write(&lock, format!("{}\n", id.to_hex()))?;
        fs::rename(&lock, &path)?;
        tracing::debug!("Updated ref {} -> {}", name, id);
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let path = self.ref_path(name)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        self.prune_empty_ref_dirs(&path);
        tracing::debug!("Deleted ref {}", name);
        Ok(true)
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let path = self.ref_path(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ObjectId::from_hex(content.trim())
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("Bad ref {}: {}", name, e)))
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let refs_root = self.refs_root();
        let mut refs = Vec::new();
        for entry in WalkDir::new(&refs_root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&refs_root) else {
                continue;
            };
            let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
            let Some(parts) = parts else {
                continue;
            };
            let name = format!("refs/{}", parts.join("/"));
            if name.ends_with(".lock") || !name.starts_with(prefix) {
                continue;
            }
            let content = fs::read_to_string(entry.path())?;
            let id = ObjectId::from_hex(content.trim())
                .map_err(|e| StorageError::Serialization(format!("Bad ref {}: {}", name, e)))?;
            refs.push((name, id));
        }
        refs.sort();
        Ok(refs)
    }
}
