//! Snapshot inputs
//!
//! Resolves command-line paths into named sources and checks them all up
//! front (existence, usable and distinct basenames) so that a bad argument is
//! rejected before anything is written to the store.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GibError, Result};
use crate::object::{MODE_EXECUTABLE, MODE_FILE, is_valid_entry_name};
use crate::storage::StorageError;

/// One snapshot input; `name` becomes its entry in the composite tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

/// Validate every input path before any store mutation
pub fn resolve_sources(paths: &[PathBuf]) -> Result<Vec<Source>> {
    if paths.is_empty() {
        return Err(GibError::Usage("No paths given to snapshot".to_string()));
    }

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let Ok(metadata) = fs::metadata(path) else {
            return Err(GibError::PathNotFound(path.clone()));
        };
        // Reading a fifo or device would block or never end
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(GibError::Usage(format!(
                "Cannot back up '{}': not a regular file or directory",
                path.display()
            )));
        }
        let name = source_name(path)?;
        if !seen.insert(name.clone()) {
            return Err(GibError::DuplicateBasename(name));
        }
        sources.push(Source {
            path: path.clone(),
            name,
            is_dir: metadata.is_dir(),
        });
    }
    Ok(sources)
}

/// Basename of `path`; paths like `.` are resolved first
fn source_name(path: &Path) -> Result<String> {
    let name = match path.file_name() {
        Some(name) => name.to_owned(),
        None => fs::canonicalize(path)?
            .file_name()
            .map(|n| n.to_owned())
            .ok_or_else(|| {
                GibError::Usage(format!("Cannot back up '{}': path has no name", path.display()))
            })?,
    };
    let name = name.to_str().ok_or_else(|| {
        GibError::Usage(format!("Cannot back up '{}': name is not valid UTF-8", path.display()))
    })?;
    if !is_valid_entry_name(name) {
        return Err(GibError::Usage(format!("Cannot back up '{}'", path.display())));
    }
    Ok(name.to_string())
}

/// Paths to leave out while walking sources (the store itself, typically)
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    excluded: Vec<PathBuf>,
}

impl SourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a directory. Paths that do not exist are ignored.
    pub fn exclude(mut self, path: &Path) -> Self {
        if let Ok(canonical) = fs::canonicalize(path) {
            self.excluded.push(canonical);
        }
        self
    }

    /// Whether the directory at `path` is excluded. Only directories are
    /// ever excluded, so callers pass `is_dir` to skip the lookup.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.excluded.is_empty() || !is_dir {
            return false;
        }
        fs::canonicalize(path)
            .map(|canonical| self.excluded.contains(&canonical))
            .unwrap_or(false)
    }

    pub fn is_excluded_entry(&self, entry: &walkdir::DirEntry) -> bool {
        self.is_excluded(entry.path(), entry.file_type().is_dir())
    }

    /// Whether `path` is an excluded directory or lies inside one
    pub fn covers(&self, path: &Path) -> bool {
        if self.excluded.is_empty() {
            return false;
        }
        fs::canonicalize(path)
            .map(|canonical| self.excluded.iter().any(|ex| canonical.starts_with(ex)))
            .unwrap_or(false)
    }
}

/// Whether a file name can become a tree entry. Names that are not valid
/// UTF-8 cannot.
pub fn is_stageable_name(name: &OsStr) -> bool {
    name.to_str().is_some_and(is_valid_entry_name)
}

/// `/`-joined path of `path` relative to `root` ("" for the root itself)
pub fn relative_stage_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| StorageError::InvalidPath(path.display().to_string()))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Tree mode for a regular file
pub fn file_mode(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            return MODE_EXECUTABLE;
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;
    MODE_FILE
}

/// Raw bytes of a symbolic link's target
pub fn link_target_bytes(path: &Path) -> Result<Vec<u8>> {
    let target = fs::read_link(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(target.as_os_str().as_bytes().to_vec())
    }
    #[cfg(not(unix))]
    {
        Ok(target.to_string_lossy().into_owned().into_bytes())
    }
}
