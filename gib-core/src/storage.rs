//! Object store capability interface
//!
//! Backends implement a handful of primitives (object put/get, a flat stage
//! area, refs). Everything the snapshot engine needs on top of that, such as
//! staging a whole tree under a prefix, writing nested trees out of the flat
//! stage, or checking the stage out to disk, is provided here once for every
//! backend.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::object::{
    MODE_EXECUTABLE, MODE_SYMLINK, ObjectId, ObjectKind, Tree, TreeEntry, is_valid_entry_name,
};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(ObjectId),

    #[error("Object {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Corrupt object {0}: {1}")]
    Corrupt(ObjectId, String),

    #[error("Invalid path in stage area: {0:?}")]
    InvalidPath(String),

    #[error("Stage area has both a file and a directory at {0:?}")]
    StageConflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// A file entry in the stage area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Blob holding the file content (or link target)
    pub id: ObjectId,
    /// Git-style mode bits
    pub mode: u32,
}

impl StagedEntry {
    pub fn new(id: ObjectId, mode: u32) -> Self {
        Self { id, mode }
    }
}

/// Content-addressed object store with a single shared stage area and
/// named refs.
///
/// All calls are blocking. The stage area is one mutable scratch slot, so
/// callers must not interleave two operations that use it (see
/// [`crate::stage::StageGuard`]).
pub trait ObjectStore {
    /// Store an object and return its id. Storing existing content is a no-op.
    fn put_object(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId>;

    /// Load an object's kind and payload
    fn get_object(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)>;

    /// Record (or replace) a file entry at `path` in the stage area
    fn stage_entry(&self, path: &str, entry: StagedEntry) -> Result<()>;

    /// All staged entries, sorted by path
    fn staged_entries(&self) -> Result<Vec<(String, StagedEntry)>>;

    /// Empty the stage area
    fn clear_stage(&self) -> Result<()>;

    /// Create or overwrite a ref
    fn put_ref(&self, name: &str, id: ObjectId) -> Result<()>;

    /// Remove a ref. Returns whether it existed; objects are never touched.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// Look up a single ref
    fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// All refs whose full name starts with `prefix`, sorted by name
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>>;

    // ==================== Provided operations ====================

    fn store_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.put_object(ObjectKind::Blob, data)
    }

    fn read_blob(&self, id: ObjectId) -> Result<Bytes> {
        let (kind, data) = self.get_object(id)?;
        expect_kind(id, ObjectKind::Blob, kind)?;
        Ok(Bytes::from(data))
    }

    fn store_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.put_object(ObjectKind::Tree, &tree.to_bytes()?)
    }

    fn read_tree(&self, id: ObjectId) -> Result<Tree> {
        let (kind, data) = self.get_object(id)?;
        expect_kind(id, ObjectKind::Tree, kind)?;
        let tree = Tree::from_bytes(&data)
            .map_err(|e| StorageError::Corrupt(id, format!("undecodable tree: {}", e)))?;
        if let Some(bad) = tree.iter().find(|e| !is_valid_entry_name(&e.name)) {
            return Err(StorageError::Corrupt(
                id,
                format!("invalid entry name {:?}", bad.name),
            ));
        }
        Ok(tree)
    }

    /// Stage a blob at `path` without needing the file on disk
    fn stage_blob_at(&self, id: ObjectId, path: &str, mode: u32) -> Result<()> {
        validate_stage_path(path)?;
        self.stage_entry(path, StagedEntry::new(id, mode))
    }

    /// Stage every file of tree `id` below `prefix` (empty prefix = root)
    fn stage_tree_at(&self, id: ObjectId, prefix: &str) -> Result<()> {
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            validate_stage_path(prefix)?;
        }
        let tree = self.read_tree(id)?;
        for entry in tree.iter() {
            let path = join_stage_path(prefix, &entry.name);
            if entry.is_tree() {
                self.stage_tree_at(entry.id, &path)?;
            } else {
                self.stage_entry(&path, StagedEntry::new(entry.id, entry.mode))?;
            }
        }
        Ok(())
    }

    /// Build nested trees out of the flat stage area and return the root id.
    /// An empty stage produces the empty tree.
    fn write_tree_from_stage(&self) -> Result<ObjectId> {
        let mut root = DirNode::default();
        for (path, entry) in self.staged_entries()? {
            root.insert(&path, entry)?;
        }
        root.store(self)
    }

    /// Write every staged file below `dest`, creating parent directories.
    /// Returns the number of files written.
    fn checkout_stage(&self, dest: &Path) -> Result<usize> {
        let entries = self.staged_entries()?;
        for (path, entry) in &entries {
            validate_stage_path(path)?;
            let target = path
                .split('/')
                .fold(dest.to_path_buf(), |acc, part| acc.join(part));
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = self.read_blob(entry.id)?;
            write_checkout_file(&target, &data, entry.mode)?;
        }
        Ok(entries.len())
    }

    /// Stage tree `id` at the root and check it out into `dest`.
    /// The stage area must be empty on entry.
    fn checkout_tree(&self, id: ObjectId, dest: &Path) -> Result<usize> {
        self.stage_tree_at(id, "")?;
        self.checkout_stage(dest)
    }
}

fn expect_kind(id: ObjectId, expected: ObjectKind, actual: ObjectKind) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StorageError::KindMismatch {
            id,
            expected: expected.as_str(),
            actual: actual.as_str(),
        })
    }
}

/// Join a stage prefix and an entry name with `/`
pub fn join_stage_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Stage paths are `/`-separated relative paths of valid entry names
pub fn validate_stage_path(path: &str) -> Result<()> {
    if path.split('/').all(is_valid_entry_name) {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

enum StageNode {
    File(StagedEntry),
    Dir(DirNode),
}

#[derive(Default)]
struct DirNode {
    children: BTreeMap<String, StageNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, entry: StagedEntry) -> Result<()> {
        validate_stage_path(path)?;
        let mut parts = path.split('/').peekable();
        let mut dir = self;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                if let Some(StageNode::Dir(_)) = dir.children.get(part) {
                    return Err(StorageError::StageConflict(path.to_string()));
                }
                dir.children.insert(part.to_string(), StageNode::File(entry));
                return Ok(());
            }
            let node = dir
                .children
                .entry(part.to_string())
                .or_insert_with(|| StageNode::Dir(DirNode::default()));
            dir = match node {
                StageNode::Dir(child) => child,
                StageNode::File(_) => return Err(StorageError::StageConflict(path.to_string())),
            };
        }
        Ok(())
    }

    fn store<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<ObjectId> {
        let mut tree = Tree::new();
        for (name, node) in &self.children {
            let entry = match node {
                StageNode::File(staged) => TreeEntry::blob(name.as_str(), staged.id, staged.mode),
                StageNode::Dir(child) => TreeEntry::tree(name.as_str(), child.store(store)?),
            };
            tree.insert(entry);
        }
        store.store_tree(&tree)
    }
}

fn write_checkout_file(target: &Path, data: &[u8], mode: u32) -> Result<()> {
    if mode == MODE_SYMLINK {
        #[cfg(unix)]
        {
            use std::ffi::OsStr;
            use std::os::unix::ffi::OsStrExt;
            std::os::unix::fs::symlink(OsStr::from_bytes(data), target)?;
            return Ok(());
        }
    }

    fs::write(target, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perm = if mode == MODE_EXECUTABLE { 0o755 } else { 0o644 };
        fs::set_permissions(target, fs::Permissions::from_mode(perm))?;
    }

    Ok(())
}
