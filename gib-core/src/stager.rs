//! Per-path staging
//!
//! Imports one snapshot source into the store. A file becomes a single blob
//! and never touches the stage area; a directory is staged file by file
//! (plus empty-directory markers) and written out as one tree.

use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::emptydir::{MarkerBlob, stage_empty_dir_markers};
use crate::error::Result;
use crate::object::{MODE_DIR, MODE_SYMLINK, ObjectId, ObjectKind};
use crate::source::{
    Source, SourceFilter, file_mode, is_stageable_name, link_target_bytes, relative_stage_path,
};
use crate::stage::StageGuard;
use crate::storage::ObjectStore;

/// Result of importing one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    /// Entry name in the composite tree
    pub name: String,
    /// Blob for a file source, tree for a directory source
    pub kind: ObjectKind,
    pub id: ObjectId,
    pub mode: u32,
}

/// Import `source` and return the blob or tree it became
pub fn stage_source<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    source: &Source,
    filter: &SourceFilter,
    marker: &mut MarkerBlob,
) -> Result<StagedSource> {
    if !source.is_dir {
        let data = fs::read(&source.path)?;
        let mode = file_mode(&fs::metadata(&source.path)?);
        let id = store.store_blob(&data)?;
        tracing::debug!("Stored file {:?} as blob {}", source.path, id);
        return Ok(StagedSource {
            name: source.name.clone(),
            kind: ObjectKind::Blob,
            id,
            mode,
        });
    }

    let guard = StageGuard::acquire(store)?;
    let files = stage_directory_files(store, config, &source.path, filter)?;
    let markers = stage_empty_dir_markers(store, config, &source.path, filter, marker)?;
    let id = store.write_tree_from_stage()?;
    guard.release()?;

    tracing::debug!(
        "Stored directory {:?} as tree {} ({} files, {} empty directories)",
        source.path,
        id,
        files,
        markers
    );
    Ok(StagedSource {
        name: source.name.clone(),
        kind: ObjectKind::Tree,
        id,
        mode: MODE_DIR,
    })
}

/// Store and stage every file and symbolic link below `root`.
/// Symbolic links are recorded as links, never followed.
fn stage_directory_files<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    root: &Path,
    filter: &SourceFilter,
) -> Result<usize> {
    let mut staged = 0;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() > 0 && !is_stageable_name(e.file_name()) {
                tracing::warn!("Skipping {:?}: name is not valid UTF-8", e.path());
                return false;
            }
            !filter.is_excluded_entry(e)
        });

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        let (id, mode) = if file_type.is_symlink() {
            (store.store_blob(&link_target_bytes(path)?)?, MODE_SYMLINK)
        } else if file_type.is_file() {
            if entry.file_name() == config.marker_name.as_str() {
                tracing::warn!(
                    "{:?} has the reserved marker name and will be removed on extraction",
                    path
                );
            }
            let data = fs::read(path)?;
            (store.store_blob(&data)?, file_mode(&entry.metadata()?))
        } else {
            tracing::warn!("Skipping special file {:?}", path);
            continue;
        };

        let rel = relative_stage_path(root, path)?;
        store.stage_blob_at(id, &rel, mode)?;
        staged += 1;
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::object::{MODE_EXECUTABLE, MODE_FILE};
    use crate::source::resolve_sources;
    use tempfile::TempDir;

    fn stage_one(store: &MemoryStore, path: &Path) -> StagedSource {
        let sources = resolve_sources(&[path.to_path_buf()]).unwrap();
        stage_source(
            store,
            &Config::default(),
            &sources[0],
            &SourceFilter::new(),
            &mut MarkerBlob::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_file_source_becomes_blob_without_staging() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, b"remember the milk").unwrap();

        let store = MemoryStore::new();
        let staged = stage_one(&store, &file);
        assert_eq!(staged.kind, ObjectKind::Blob);
        assert_eq!(staged.name, "notes.txt");
        assert_eq!(staged.mode, MODE_FILE);
        assert_eq!(store.read_blob(staged.id).unwrap().as_ref(), b"remember the milk");
        assert_eq!(store.stage_len(), 0);
    }

    #[test]
    fn test_directory_source_becomes_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("project");
        fs::create_dir_all(src.join("src")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("README"), b"readme").unwrap();
        fs::write(src.join("src/main.rs"), b"fn main() {}").unwrap();

        let store = MemoryStore::new();
        let staged = stage_one(&store, &src);
        assert_eq!(staged.kind, ObjectKind::Tree);
        assert_eq!(store.stage_len(), 0);

        let tree = store.read_tree(staged.id).unwrap();
        let names: Vec<_> = tree.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README", "empty", "src"]);

        let empty = store.read_tree(tree.get("empty").unwrap().id).unwrap();
        assert!(empty.get(".gibkeep").is_some());
    }

    #[test]
    fn test_identical_directories_share_tree() {
        let dir = TempDir::new().unwrap();
        for name in ["one", "two"] {
            let root = dir.path().join(name);
            fs::create_dir_all(root.join("sub")).unwrap();
            fs::write(root.join("sub/file"), b"same").unwrap();
        }
        let store = MemoryStore::new();
        let one = stage_one(&store, &dir.path().join("one"));
        let two = stage_one(&store, &dir.path().join("two"));
        assert_eq!(one.id, two.id);
    }

    #[test]
    fn test_excluded_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("home");
        fs::create_dir_all(src.join(".gib/objects")).unwrap();
        fs::write(src.join(".gib/objects/blob"), b"internal").unwrap();
        fs::write(src.join("keep.txt"), b"keep").unwrap();

        let store = MemoryStore::new();
        let sources = resolve_sources(&[src.clone()]).unwrap();
        let filter = SourceFilter::new().exclude(&src.join(".gib"));
        let staged = stage_source(
            &store,
            &Config::default(),
            &sources[0],
            &filter,
            &mut MarkerBlob::new(),
        )
        .unwrap();

        let tree = store.read_tree(staged.id).unwrap();
        let names: Vec<_> = tree.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["keep.txt"]);
    }

    // Other unix filesystems (APFS) refuse non-UTF-8 names outright
    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let src = dir.path().join("data");
        fs::create_dir_all(src.join("latin1")).unwrap();
        fs::write(src.join("ok.txt"), b"fine").unwrap();
        fs::write(src.join(OsStr::from_bytes(b"caf\xe9.txt")), b"skipped").unwrap();
        fs::write(src.join("latin1").join(OsStr::from_bytes(b"na\xefve")), b"skipped").unwrap();

        let store = MemoryStore::new();
        let tree = store.read_tree(stage_one(&store, &src).id).unwrap();
        let names: Vec<_> = tree.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["latin1", "ok.txt"]);

        // The directory survives even though its only file was left out
        let latin1 = store.read_tree(tree.get("latin1").unwrap().id).unwrap();
        let names: Vec<_> = latin1.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".gibkeep"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_and_symlink_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let src = dir.path().join("bin");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("tool"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(src.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("tool", src.join("alias")).unwrap();

        let store = MemoryStore::new();
        let tree = store.read_tree(stage_one(&store, &src).id).unwrap();

        assert_eq!(tree.get("tool").unwrap().mode, MODE_EXECUTABLE);
        let alias = tree.get("alias").unwrap();
        assert_eq!(alias.mode, MODE_SYMLINK);
        assert_eq!(store.read_blob(alias.id).unwrap().as_ref(), b"tool");
    }
}
