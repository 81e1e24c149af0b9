//! Snapshot extraction
//!
//! Materializes a stored snapshot into a fresh directory and strips the
//! empty-directory markers again. An existing destination is never touched.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{GibError, Result};
use crate::object::ObjectId;
use crate::refs::{snapshot_ref, validate_name};
use crate::stage::StageGuard;
use crate::storage::ObjectStore;

/// Summary of a finished extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub refname: String,
    pub tree: ObjectId,
    pub dest: PathBuf,
    /// Files written, markers included
    pub files: usize,
    pub markers_removed: usize,
}

pub fn extract<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    backup: &str,
    snapshot: &str,
    dest: &Path,
) -> Result<Extraction> {
    validate_name("backup", backup)?;
    validate_name("snapshot", snapshot)?;

    let refname = snapshot_ref(config, backup, snapshot);
    let tree = store
        .resolve_ref(&refname)?
        .ok_or_else(|| GibError::RefNotFound {
            backup: backup.to_string(),
            snapshot: snapshot.to_string(),
        })?;

    // symlink_metadata so that even a dangling link counts as occupied
    if fs::symlink_metadata(dest).is_ok() {
        return Err(GibError::DestinationExists(dest.to_path_buf()));
    }
    fs::create_dir_all(dest)?;

    let guard = StageGuard::acquire(store)?;
    let files = store.checkout_tree(tree, dest)?;
    let markers_removed = remove_markers(dest, &config.marker_name)?;
    guard.release()?;

    tracing::info!(
        "Extracted {} ({}) into {:?}: {} files, {} empty directories",
        refname,
        tree,
        dest,
        files - markers_removed,
        markers_removed
    );
    Ok(Extraction {
        refname,
        tree,
        dest: dest.to_path_buf(),
        files,
        markers_removed,
    })
}

/// Delete every marker file below `dest`, leaving its directory in place
fn remove_markers(dest: &Path, marker_name: &str) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dest).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == marker_name {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
