//! gib Core Library
//!
//! Incremental, deduplicated point-in-time snapshots of filesystem paths:
//! - Object model (Blob, Tree) with content addressing
//! - Object store capability trait with disk and in-memory backends
//! - Empty-directory preservation, per-path staging, tree composition
//! - Snapshot lifecycle with no-op detection
//! - Extraction and ref catalog operations

pub mod catalog;
pub mod compose;
pub mod config;
pub mod disk_store;
pub mod emptydir;
pub mod error;
pub mod extract;
pub mod memory_store;
pub mod object;
pub mod refs;
pub mod repository;
pub mod snapshot;
pub mod source;
pub mod stage;
pub mod stager;
pub mod storage;

pub use catalog::DeleteOutcome;
pub use config::Config;
pub use disk_store::DiskStore;
pub use error::{GibError, Result};
pub use extract::Extraction;
pub use memory_store::MemoryStore;
pub use object::{ObjectId, ObjectKind, Tree, TreeEntry};
pub use repository::{DEFAULT_STORE_DIR, Repository};
pub use snapshot::SnapshotOutcome;
pub use source::SourceFilter;
pub use stage::StageGuard;
pub use storage::{ObjectStore, StagedEntry, StorageError};
