//! Empty-directory preservation
//!
//! Trees can only hold files, so a directory with nothing in it would vanish
//! from a snapshot. Every such directory gets a marker entry pointing at the
//! empty blob; extraction deletes the markers again.

use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::object::{MODE_FILE, ObjectId};
use crate::source::{SourceFilter, is_stageable_name, relative_stage_path};
use crate::storage::{ObjectStore, join_stage_path};

/// The empty blob markers point at, stored at most once per invocation
#[derive(Debug, Default)]
pub struct MarkerBlob {
    id: Option<ObjectId>,
}

impl MarkerBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id<S: ObjectStore + ?Sized>(&mut self, store: &S) -> Result<ObjectId> {
        if let Some(id) = self.id {
            return Ok(id);
        }
        let id = store.store_blob(&[])?;
        self.id = Some(id);
        Ok(id)
    }
}

/// Stage a marker for every empty directory under `root` (root included).
/// Only the stage area is touched; returns the number of markers staged.
pub fn stage_empty_dir_markers<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    root: &Path,
    filter: &SourceFilter,
    marker: &mut MarkerBlob,
) -> Result<usize> {
    let mut staged = 0;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            (e.depth() == 0 || is_stageable_name(e.file_name())) && !filter.is_excluded_entry(e)
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_dir() || has_stageable_children(entry.path(), filter)? {
            continue;
        }
        let rel = relative_stage_path(root, entry.path())?;
        let path = join_stage_path(&rel, &config.marker_name);
        store.stage_blob_at(marker.id(store)?, &path, MODE_FILE)?;
        tracing::debug!("Preserving empty directory {:?}", entry.path());
        staged += 1;
    }
    Ok(staged)
}

/// Whether `dir` holds anything the stager will record: a file, a symbolic
/// link, or a directory that is not excluded. Entries with unstageable
/// names do not count.
fn has_stageable_children(dir: &Path, filter: &SourceFilter) -> Result<bool> {
    for child in fs::read_dir(dir)? {
        let child = child?;
        if !is_stageable_name(&child.file_name()) {
            continue;
        }
        let file_type = child.file_type()?;
        if file_type.is_file() || file_type.is_symlink() {
            return Ok(true);
        }
        if file_type.is_dir() && !filter.is_excluded(&child.path(), true) {
            return Ok(true);
        }
    }
    Ok(false)
}
