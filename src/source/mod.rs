//! Input listing and source-file selection.
//!
//! Ownership model:
//! - `ObjectLister` is the storage-facing interface that enumerates objects
//!   with their sizes under a prefix.
//! - `select_files` is a pure function over a listing and the run parameters;
//!   it never touches storage itself, so repeated calls with the same inputs
//!   always agree.

use std::collections::HashSet;
use std::path::Path;

use crate::config::{DateWindow, ScanFamily};
use crate::errors::PipelineError;
use crate::types::{PathString, SourceId};

/// Path parsing helpers for dated source layouts.
pub mod indexing;
mod selector;

pub use selector::select_files;

/// One listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object path.
    pub path: PathString,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectMeta {
    /// Build a listing entry.
    pub fn new(path: impl Into<PathString>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// Storage-facing listing interface.
pub trait ObjectLister: Send + Sync {
    /// Every object (recursively) under `prefix`.
    ///
    /// A prefix that does not exist lists as empty.
    fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>, PipelineError>;
}

/// Fixed listing, for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLister {
    objects: Vec<ObjectMeta>,
}

impl InMemoryLister {
    /// Lister returning `objects` filtered by prefix.
    pub fn new(objects: Vec<ObjectMeta>) -> Self {
        Self { objects }
    }
}

impl ObjectLister for InMemoryLister {
    fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>, PipelineError> {
        Ok(self
            .objects
            .iter()
            .filter(|object| Path::new(&object.path).starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Select this run's files by listing `prefix` through `lister`.
pub fn select_from_lister(
    lister: &dyn ObjectLister,
    prefix: &Path,
    family: ScanFamily,
    window: &DateWindow,
    already_ingested: &HashSet<SourceId>,
) -> Result<Vec<PathString>, PipelineError> {
    let listing = lister.list(prefix)?;
    Ok(select_files(family, &listing, window, already_ingested))
}
