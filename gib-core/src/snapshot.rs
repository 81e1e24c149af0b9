//! Snapshot lifecycle
//!
//! Validates the inputs, builds the composite tree, and records a new
//! timestamped ref unless the tree is identical to the backup's latest
//! snapshot.

use chrono::NaiveDateTime;
use std::fmt;
use std::path::PathBuf;

use crate::compose::compose_tree;
use crate::config::Config;
use crate::emptydir::MarkerBlob;
use crate::error::{GibError, Result};
use crate::object::ObjectId;
use crate::refs::{snapshot_ref, snapshots_prefix, strip_namespace, timestamp_name, validate_name};
use crate::source::{Source, SourceFilter, resolve_sources};
use crate::stager::stage_source;
use crate::storage::ObjectStore;

/// What a snapshot invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A new ref was written
    Created { refname: String, tree: ObjectId },
    /// Content matched the latest snapshot; nothing was recorded
    Unchanged { latest: String, tree: ObjectId },
}

impl SnapshotOutcome {
    pub fn tree(&self) -> ObjectId {
        match self {
            SnapshotOutcome::Created { tree, .. } | SnapshotOutcome::Unchanged { tree, .. } => *tree,
        }
    }
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOutcome::Created { refname, tree } => {
                write!(f, "Made snapshot {} = {}", refname, tree)
            }
            SnapshotOutcome::Unchanged { latest, .. } => write!(
                f,
                "Didn't make snapshot, no changes since last snapshot on {}",
                latest
            ),
        }
    }
}

/// Latest snapshot ref of `backup` (lexicographically greatest name)
pub fn latest_snapshot<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    backup: &str,
) -> Result<Option<(String, ObjectId)>> {
    Ok(store
        .list_refs(&snapshots_prefix(config, backup))?
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0)))
}

/// Import `sources` and compose them into one tree
pub fn build_snapshot_tree<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    sources: &[Source],
    filter: &SourceFilter,
) -> Result<ObjectId> {
    let mut marker = MarkerBlob::new();
    let staged = sources
        .iter()
        .map(|source| stage_source(store, config, source, filter, &mut marker))
        .collect::<Result<Vec<_>>>()?;
    compose_tree(store, &staged)
}

/// Snapshot `paths` into `backup`, naming a new snapshot after `now`
pub fn snapshot<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    backup: &str,
    paths: &[PathBuf],
    filter: &SourceFilter,
    now: NaiveDateTime,
) -> Result<SnapshotOutcome> {
    validate_name("backup", backup)?;
    let sources = resolve_sources(paths)?;
    if let Some(source) = sources.iter().find(|s| filter.covers(&s.path)) {
        return Err(GibError::Usage(format!(
            "Cannot back up '{}': it is part of the store",
            source.path.display()
        )));
    }

    let latest = latest_snapshot(store, config, backup)?;
    let tree = build_snapshot_tree(store, config, &sources, filter)?;

    if let Some((latest_ref, latest_tree)) = &latest {
        if *latest_tree == tree {
            tracing::info!("No changes since {}, skipping snapshot", latest_ref);
            return Ok(SnapshotOutcome::Unchanged {
                latest: latest_ref.clone(),
                tree,
            });
        }
    }

    let refname = snapshot_ref(config, backup, &timestamp_name(now));
    if store.resolve_ref(&refname)?.is_some() {
        return Err(GibError::SnapshotExists(
            strip_namespace(config, &refname).to_string(),
        ));
    }
    if let Some((latest_ref, _)) = &latest {
        if refname < *latest_ref {
            tracing::warn!(
                "New snapshot {} sorts before existing {}; the clock may have gone backwards",
                refname,
                latest_ref
            );
        }
    }

    store.put_ref(&refname, tree)?;
    tracing::info!("Created snapshot {} -> {}", refname, tree);
    Ok(SnapshotOutcome::Created { refname, tree })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2012, 2, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn run(store: &MemoryStore, backup: &str, paths: &[PathBuf], now: NaiveDateTime) -> Result<SnapshotOutcome> {
        snapshot(store, &Config::default(), backup, paths, &SourceFilter::new(), now)
    }

    fn source_dir(dir: &TempDir) -> PathBuf {
        let src = dir.path().join("documents");
        fs::create_dir_all(src.join("letters")).unwrap();
        fs::create_dir_all(src.join("drafts")).unwrap();
        fs::write(src.join("letters/dear.txt"), b"Dear reader").unwrap();
        src
    }

    #[test]
    fn test_first_snapshot_creates_ref() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        let outcome = run(&store, "home", &[src], at(12, 0, 0)).unwrap();
        match &outcome {
            SnapshotOutcome::Created { refname, tree } => {
                assert_eq!(refname, "refs/gib/home/snapshots/20120209_120000");
                assert_eq!(store.resolve_ref(refname).unwrap(), Some(*tree));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            outcome.to_string(),
            format!("Made snapshot refs/gib/home/snapshots/20120209_120000 = {}", outcome.tree())
        );
    }

    #[test]
    fn test_unchanged_sources_are_a_noop() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        let first = run(&store, "home", &[src.clone()], at(12, 0, 0)).unwrap();
        let second = run(&store, "home", &[src], at(13, 0, 0)).unwrap();

        assert_eq!(
            second,
            SnapshotOutcome::Unchanged {
                latest: "refs/gib/home/snapshots/20120209_120000".to_string(),
                tree: first.tree(),
            }
        );
        assert_eq!(store.list_refs("refs/gib/home/").unwrap().len(), 1);
        assert!(second.to_string().starts_with("Didn't make snapshot"));
    }

    #[test]
    fn test_changed_byte_creates_later_snapshot() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        let first = run(&store, "home", &[src.clone()], at(12, 0, 0)).unwrap();
        fs::write(src.join("letters/dear.txt"), b"Dear Reader").unwrap();
        let second = run(&store, "home", &[src], at(12, 0, 1)).unwrap();

        assert_ne!(first.tree(), second.tree());
        let SnapshotOutcome::Created { refname, .. } = &second else {
            panic!("expected a new snapshot, got {second:?}");
        };
        let (latest, _) = latest_snapshot(&store, &Config::default(), "home").unwrap().unwrap();
        assert_eq!(&latest, refname);
        assert!(refname.as_str() > "refs/gib/home/snapshots/20120209_120000");
    }

    #[test]
    fn test_new_empty_directory_is_a_change() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        let first = run(&store, "home", &[src.clone()], at(12, 0, 0)).unwrap();
        fs::create_dir(src.join("new-empty")).unwrap();
        let second = run(&store, "home", &[src], at(12, 5, 0)).unwrap();
        assert_ne!(first.tree(), second.tree());
    }

    #[test]
    fn test_backups_are_independent() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        run(&store, "home", &[src.clone()], at(12, 0, 0)).unwrap();
        let other = run(&store, "work", &[src], at(12, 0, 0)).unwrap();
        assert!(matches!(other, SnapshotOutcome::Created { .. }));
    }

    #[test]
    fn test_duplicate_basename_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a/data");
        let b = dir.path().join("b/data");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("file"), b"a").unwrap();
        fs::write(b.join("file"), b"b").unwrap();

        let store = MemoryStore::new();
        let err = run(&store, "home", &[a, b], at(12, 0, 0)).unwrap_err();
        assert!(matches!(err, GibError::DuplicateBasename(_)));
        assert_eq!(store.object_count(), 0);
        assert!(store.list_refs("refs/").unwrap().is_empty());
    }

    #[test]
    fn test_missing_path_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();
        let err = run(&store, "home", &[src, dir.path().join("gone")], at(12, 0, 0)).unwrap_err();
        assert!(matches!(err, GibError::PathNotFound(_)));
        assert_eq!(store.object_count(), 0);
    }

    #[test]
    fn test_same_second_collision_is_an_error() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();

        run(&store, "home", &[src.clone()], at(12, 0, 0)).unwrap();
        fs::write(src.join("letters/new.txt"), b"new").unwrap();
        let err = run(&store, "home", &[src], at(12, 0, 0)).unwrap_err();
        match err {
            GibError::SnapshotExists(name) => assert_eq!(name, "home/snapshots/20120209_120000"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.list_refs("refs/gib/home/").unwrap().len(), 1);
        assert_eq!(store.stage_len(), 0);
    }

    #[test]
    fn test_excluded_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store_dir = dir.path().join(".gib");
        fs::create_dir_all(store_dir.join("refs")).unwrap();
        let filter = SourceFilter::new().exclude(&store_dir);
        let store = MemoryStore::new();

        for inside in [store_dir.clone(), store_dir.join("refs")] {
            let err = snapshot(
                &store,
                &Config::default(),
                "home",
                &[src.clone(), inside],
                &filter,
                at(12, 0, 0),
            )
            .unwrap_err();
            assert!(matches!(err, GibError::Usage(_)));
        }
        assert_eq!(store.object_count(), 0);
        assert!(store.list_refs("refs/").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_backup_name() {
        let dir = TempDir::new().unwrap();
        let src = source_dir(&dir);
        let store = MemoryStore::new();
        assert!(matches!(
            run(&store, "a/b", &[src], at(12, 0, 0)),
            Err(GibError::Usage(_))
        ));
    }
}
