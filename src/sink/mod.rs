//! Destinations rows are committed to.
//!
//! Sinks stage everything in a temporary directory next to the destination
//! and only move it into place once every file is written. Data a commit
//! displaces is moved into the staging directory rather than deleted, so a
//! rename that fails part way can be undone and a failed run leaves the
//! destination as it was. The already-ingested set for the next incremental
//! run is read back from committed data only.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::config::{Destination, ScanFamily, table_dir};
use crate::data::Row;
use crate::errors::PipelineError;
use crate::types::SourceId;

mod files;
mod table;

pub use files::FileTreeSink;
pub use table::TableSink;

/// How a commit treats data already at the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep existing data and add the new rows.
    Append,
    /// Replace the family's data with the new rows.
    Replace,
}

impl WriteMode {
    /// `Append` for incremental runs, `Replace` otherwise.
    pub fn for_incremental(incremental: bool) -> Self {
        if incremental {
            WriteMode::Append
        } else {
            WriteMode::Replace
        }
    }
}

/// What a commit wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Files moved into the destination.
    pub files: usize,
    /// Rows written across those files.
    pub rows: usize,
}

/// A destination for joined rows.
pub trait Sink: Send + Sync {
    /// Sources already committed for `family`.
    fn existing_sources(&self, family: ScanFamily) -> Result<HashSet<SourceId>, PipelineError>;

    /// Write `rows` for `family` and make them visible together, or not at all.
    fn commit(
        &self,
        family: ScanFamily,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<CommitSummary, PipelineError>;
}

/// Sink for `destination`; table destinations resolve under `warehouse`.
pub fn sink_for(destination: &Destination, warehouse: &Path) -> Box<dyn Sink> {
    match destination {
        Destination::FileTree { root } => Box::new(FileTreeSink::new(root.clone())),
        Destination::Table { dataset, table } => {
            Box::new(TableSink::new(table_dir(warehouse, dataset, table)))
        }
    }
}

pub(crate) fn destination_error(path: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::Destination {
        destination: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// One rename of a commit plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Move {
    from: PathBuf,
    to: PathBuf,
}

impl Move {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Apply `moves` in order. If one fails, the moves already made are undone
/// in reverse before the error is returned.
///
/// Parent directories of every `to` must already exist.
pub(crate) fn move_all(moves: &[Move]) -> Result<(), PipelineError> {
    for (done, step) in moves.iter().enumerate() {
        if let Err(err) = fs::rename(&step.from, &step.to) {
            for applied in moves[..done].iter().rev() {
                if let Err(undo) = fs::rename(&applied.to, &applied.from) {
                    error!(
                        from = %applied.to.display(),
                        to = %applied.from.display(),
                        error = %undo,
                        "failed to restore destination after aborted commit"
                    );
                }
            }
            return Err(destination_error(&step.to, err));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn failed_move_restores_earlier_moves() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("live.json");
        let aside = dir.path().join("aside.json");
        let staged = dir.path().join("staged.json");
        let blocked = dir.path().join("blocked");
        fs::write(&live, "old").unwrap();
        fs::write(&staged, "new").unwrap();
        fs::create_dir_all(blocked.join("occupied")).unwrap();

        let err = move_all(&[Move::new(&live, &aside), Move::new(&staged, &blocked)]).unwrap_err();
        assert!(matches!(err, PipelineError::Destination { .. }));
        assert_eq!(fs::read_to_string(&live).unwrap(), "old");
        assert!(!aside.exists());
        assert_eq!(fs::read_to_string(&staged).unwrap(), "new");
    }

    #[test]
    fn moves_apply_in_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        fs::write(&first, "x").unwrap();
        move_all(&[Move::new(&first, &second), Move::new(&second, dir.path().join("c"))]).unwrap();
        assert!(!first.exists() && !second.exists());
        assert_eq!(fs::read_to_string(dir.path().join("c")).unwrap(), "x");
    }
}
