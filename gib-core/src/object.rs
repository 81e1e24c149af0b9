//! Core object model for gib
//!
//! Content-addressable Blob and Tree objects. Blobs hold file content, trees
//! map entry names to blobs or subtrees. Identical content always yields an
//! identical [`ObjectId`], which is what makes snapshots deduplicate and what
//! no-op detection compares.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Mode of a regular, non-executable file entry
pub const MODE_FILE: u32 = 0o100644;
/// Mode of an executable file entry
pub const MODE_EXECUTABLE: u32 = 0o100755;
/// Mode of a symbolic link entry (blob holds the link target)
pub const MODE_SYMLINK: u32 = 0o120000;
/// Mode of a subtree entry
pub const MODE_DIR: u32 = 0o040000;

/// Unique identifier for any stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Create a new ObjectId from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the id of an object of `kind` with the given payload.
    ///
    /// The kind and length are hashed as a header so that a blob whose bytes
    /// happen to equal a serialized tree still gets a distinct id.
    pub fn for_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Object type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
        }
    }

    /// Single byte written in front of the payload in object files
    pub fn tag(&self) -> u8 {
        match self {
            ObjectKind::Blob => b'b',
            ObjectKind::Tree => b't',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'b' => Some(ObjectKind::Blob),
            b't' => Some(ObjectKind::Tree),
            _ => None,
        }
    }
}

/// Directory tree entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Name of the entry (a single path component)
    pub name: String,
    /// Object ID (points to Blob or Tree)
    pub id: ObjectId,
    /// Entry type
    pub kind: ObjectKind,
    /// Git-style mode bits
    pub mode: u32,
}

impl TreeEntry {
    /// Create a new tree entry
    pub fn new(name: String, id: ObjectId, kind: ObjectKind, mode: u32) -> Self {
        Self {
            name,
            id,
            kind,
            mode,
        }
    }

    pub fn blob(name: impl Into<String>, id: ObjectId, mode: u32) -> Self {
        Self::new(name.into(), id, ObjectKind::Blob, mode)
    }

    pub fn tree(name: impl Into<String>, id: ObjectId) -> Self {
        Self::new(name.into(), id, ObjectKind::Tree, MODE_DIR)
    }

    pub fn is_tree(&self) -> bool {
        self.kind == ObjectKind::Tree
    }
}

/// Directory object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Sorted entries for deterministic hashing
    pub entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or update an entry
    pub fn insert(&mut self, entry: TreeEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Remove an entry
    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries.remove(name)
    }

    /// Get an entry
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to binary format
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary format
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }

    /// Compute the object ID
    pub fn id(&self) -> Result<ObjectId, bincode::Error> {
        Ok(ObjectId::for_object(ObjectKind::Tree, &self.to_bytes()?))
    }

    /// Iterate over entries in name order
    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.values()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `name` can be used as a single tree entry name.
pub fn is_valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
