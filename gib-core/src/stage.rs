//! Scoped use of the shared stage area
//!
//! The stage is cleared when a guard is acquired, since an interrupted
//! earlier operation may have left entries behind, and again when the guard
//! is released or dropped, so no exit path leaves it dirty.

use crate::storage::{ObjectStore, Result};

pub struct StageGuard<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    released: bool,
}

impl<'a, S: ObjectStore + ?Sized> StageGuard<'a, S> {
    /// Clear the stage and take it for the duration of one operation
    pub fn acquire(store: &'a S) -> Result<Self> {
        store.clear_stage()?;
        Ok(Self {
            store,
            released: false,
        })
    }

    /// Clear the stage, reporting a failure instead of only logging it
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.clear_stage()
    }
}

impl<S: ObjectStore + ?Sized> Drop for StageGuard<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.store.clear_stage() {
            tracing::warn!("Failed to clear stage area: {}", e);
        }
    }
}
