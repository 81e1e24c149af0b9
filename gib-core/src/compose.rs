//! Tree composition
//!
//! Merges the per-source results of one snapshot invocation into a single
//! root tree keyed by basename. Directory trees are grafted under
//! `<name>/`, files are staged straight from their blob id. The result only
//! depends on the inputs, so composing identical inputs twice gives the
//! same hash.

use crate::error::Result;
use crate::object::{ObjectId, ObjectKind};
use crate::stage::StageGuard;
use crate::stager::StagedSource;
use crate::storage::ObjectStore;

pub fn compose_tree<S: ObjectStore + ?Sized>(store: &S, sources: &[StagedSource]) -> Result<ObjectId> {
    let guard = StageGuard::acquire(store)?;

    for source in sources.iter().filter(|s| s.kind == ObjectKind::Tree) {
        store.stage_tree_at(source.id, &source.name)?;
    }
    for source in sources.iter().filter(|s| s.kind == ObjectKind::Blob) {
        store.stage_blob_at(source.id, &source.name, source.mode)?;
    }

    let id = store.write_tree_from_stage()?;
    guard.release()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::emptydir::MarkerBlob;
    use crate::memory_store::MemoryStore;
    use crate::object::{MODE_DIR, MODE_FILE};
    use crate::source::{SourceFilter, resolve_sources};
    use crate::stager::stage_source;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn stage_all(store: &MemoryStore, paths: &[PathBuf]) -> Vec<StagedSource> {
        let mut marker = MarkerBlob::new();
        resolve_sources(paths)
            .unwrap()
            .iter()
            .map(|s| stage_source(store, &Config::default(), s, &SourceFilter::new(), &mut marker).unwrap())
            .collect()
    }

    fn fixture(dir: &TempDir) -> Vec<PathBuf> {
        let a = dir.path().join("alpha");
        let b = dir.path().join("beta");
        let f = dir.path().join("todo.txt");
        fs::create_dir_all(a.join("nested")).unwrap();
        fs::write(a.join("nested/one.txt"), b"one").unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("two.txt"), b"two").unwrap();
        fs::write(&f, b"todo").unwrap();
        vec![a, b, f]
    }

    #[test]
    fn test_composite_has_one_entry_per_source() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let store = MemoryStore::new();
        let staged = stage_all(&store, &paths);

        let root = store.read_tree(compose_tree(&store, &staged).unwrap()).unwrap();
        assert_eq!(root.len(), 3);

        let alpha = root.get("alpha").unwrap();
        assert_eq!(alpha.mode, MODE_DIR);
        assert_eq!(alpha.id, staged[0].id);
        assert_eq!(root.get("beta").unwrap().id, staged[1].id);

        let todo = root.get("todo.txt").unwrap();
        assert_eq!(todo.kind, ObjectKind::Blob);
        assert_eq!(todo.mode, MODE_FILE);
        assert_eq!(store.stage_len(), 0);
    }

    #[test]
    fn test_composition_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let store = MemoryStore::new();

        let first = compose_tree(&store, &stage_all(&store, &paths)).unwrap();
        let second = compose_tree(&store, &stage_all(&store, &paths)).unwrap();
        assert_eq!(first, second);

        let reordered: Vec<PathBuf> = paths.iter().rev().cloned().collect();
        let third = compose_tree(&store, &stage_all(&store, &reordered)).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn test_composition_ignores_stale_stage() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let store = MemoryStore::new();
        let staged = stage_all(&store, &paths);
        let clean = compose_tree(&store, &staged).unwrap();

        let junk = store.store_blob(b"junk").unwrap();
        store.stage_blob_at(junk, "interrupted/leftover", MODE_FILE).unwrap();
        assert_eq!(compose_tree(&store, &staged).unwrap(), clean);
    }
}
