//! In-memory object store
//!
//! Same semantics as the disk store, nothing persisted. Handy for tests and
//! for dry runs that only need the resulting hashes.

use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::object::{ObjectId, ObjectKind};
use crate::storage::{ObjectStore, Result, StagedEntry, StorageError, validate_stage_path};

/// In-memory object store
#[derive(Default)]
pub struct MemoryStore {
    /// Object storage
    objects: RefCell<HashMap<ObjectId, (ObjectKind, Bytes)>>,

    /// Flat stage area (path -> entry)
    stage: RefCell<BTreeMap<String, StagedEntry>>,

    /// Ref name -> object
    refs: RefCell<BTreeMap<String, ObjectId>>,
}

impl MemoryStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct objects stored
    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Number of entries currently staged
    pub fn stage_len(&self) -> usize {
        self.stage.borrow().len()
    }
}

impl ObjectStore for MemoryStore {
    fn put_object(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_object(kind, payload);
        self.objects
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| (kind, Bytes::copy_from_slice(payload)));
        Ok(id)
    }

    fn get_object(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        self.objects
            .borrow()
            .get(&id)
            .map(|(kind, data)| (*kind, data.to_vec()))
            .ok_or(StorageError::NotFound(id))
    }

    fn stage_entry(&self, path: &str, entry: StagedEntry) -> Result<()> {
        validate_stage_path(path)?;
        self.stage.borrow_mut().insert(path.to_string(), entry);
        Ok(())
    }

    fn staged_entries(&self) -> Result<Vec<(String, StagedEntry)>> {
        Ok(self
            .stage
            .borrow()
            .iter()
            .map(|(path, entry)| (path.clone(), *entry))
            .collect())
    }

    fn clear_stage(&self) -> Result<()> {
        self.stage.borrow_mut().clear();
        Ok(())
    }

    fn put_ref(&self, name: &str, id: ObjectId) -> Result<()> {
        self.refs.borrow_mut().insert(name.to_string(), id);
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        Ok(self.refs.borrow_mut().remove(name).is_some())
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.borrow().get(name).copied())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .refs
            .borrow()
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }
}
