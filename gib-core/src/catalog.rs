//! Listing and deleting snapshot refs

use std::fmt;

use crate::config::Config;
use crate::error::Result;
use crate::object::ObjectId;
use crate::refs::{catalog_prefix, snapshot_ref, strip_namespace, validate_name};
use crate::storage::ObjectStore;

/// Ref names under the namespace (optionally one backup), namespace
/// stripped, sorted ascending
pub fn list<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    backup: Option<&str>,
) -> Result<Vec<String>> {
    if let Some(backup) = backup {
        validate_name("backup", backup)?;
    }
    let mut names: Vec<String> = store
        .list_refs(&catalog_prefix(config, backup))?
        .into_iter()
        .map(|(name, _)| strip_namespace(config, &name).to_string())
        .collect();
    names.sort();
    Ok(names)
}

/// Result of a delete request. A missing snapshot is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { refname: String, tree: ObjectId },
    NotFound {
        backup: String,
        snapshot: String,
        refname: String,
    },
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::Deleted { refname, tree } => {
                write!(f, "Deleted snapshot {} (was {})", refname, tree)
            }
            DeleteOutcome::NotFound { backup, snapshot, .. } => {
                write!(f, "Snapshot {} for backup {} does not exist", snapshot, backup)
            }
        }
    }
}

/// Remove one snapshot ref. The objects it pointed at stay in the store.
pub fn delete<S: ObjectStore + ?Sized>(
    store: &S,
    config: &Config,
    backup: &str,
    snapshot: &str,
) -> Result<DeleteOutcome> {
    validate_name("backup", backup)?;
    validate_name("snapshot", snapshot)?;

    let refname = snapshot_ref(config, backup, snapshot);
    let Some(tree) = store.resolve_ref(&refname)? else {
        tracing::info!("Snapshot {} not found, nothing deleted", refname);
        return Ok(DeleteOutcome::NotFound {
            backup: backup.to_string(),
            snapshot: snapshot.to_string(),
            refname,
        });
    };
    store.delete_ref(&refname)?;
    tracing::info!("Deleted snapshot {}", refname);
    Ok(DeleteOutcome::Deleted { refname, tree })
}
