use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use tempfile::TempDir;
use tracing::info;

use crate::config::ScanFamily;
use crate::constants::output::{DISPLACED_DIR, STAGING_PREFIX};
use crate::data::Row;
use crate::errors::PipelineError;
use crate::partition::{partition_path, source_from_partition};
use crate::sink::{CommitSummary, Move, Sink, WriteMode, move_all};
use crate::transport::fs::{files_under, read_lines, write_json_lines_gz};
use crate::types::{PartitionPath, SourceId};

/// Partitioned tree of gzip JSON-lines files:
/// `<root>/<family>/source=<id>/country=<cc>/results.json.gz`.
#[derive(Clone, Debug)]
pub struct FileTreeSink {
    root: PathBuf,
}

impl FileTreeSink {
    /// Sink writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stage(&self, family: ScanFamily, rows: &[Row]) -> Result<(TempDir, Vec<PartitionPath>), PipelineError> {
        fs::create_dir_all(&self.root)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)?;

        let mut partitions: IndexMap<PartitionPath, Vec<&Row>> = IndexMap::new();
        for row in rows {
            partitions.entry(partition_path(family, row)).or_default().push(row);
        }
        for (relative, partition_rows) in &partitions {
            write_json_lines_gz(&staging.path().join(relative), partition_rows.iter().copied())?;
        }
        Ok((staging, partitions.into_keys().collect()))
    }
}

impl Sink for FileTreeSink {
    fn existing_sources(&self, family: ScanFamily) -> Result<HashSet<SourceId>, PipelineError> {
        let family_root = self.root.join(family.as_str());
        let files = files_under(&family_root, |_| true)?;
        Ok(files
            .iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(&family_root).ok()?;
                source_from_partition(&relative.to_string_lossy()).map(str::to_string)
            })
            .collect())
    }

    fn commit(
        &self,
        family: ScanFamily,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<CommitSummary, PipelineError> {
        let (staging, partitions) = self.stage(family, rows)?;
        let displaced = staging.path().join(DISPLACED_DIR);
        let moves = match mode {
            WriteMode::Replace => {
                let family_root = self.root.join(family.as_str());
                let staged_family = staging.path().join(family.as_str());
                let mut moves = Vec::with_capacity(2);
                if family_root.exists() {
                    fs::create_dir_all(&displaced)?;
                    moves.push(Move::new(&family_root, displaced.join(family.as_str())));
                }
                if staged_family.exists() {
                    moves.push(Move::new(staged_family, family_root));
                }
                moves
            }
            WriteMode::Append => {
                let mut moves = Vec::with_capacity(partitions.len() * 2);
                for relative in &partitions {
                    let staged = staging.path().join(relative);
                    let target = self.root.join(relative);
                    if target.exists() {
                        merge_existing(&target, &staged)?;
                        let aside = displaced.join(relative);
                        create_parent(&aside)?;
                        moves.push(Move::new(&target, aside));
                    }
                    create_parent(&target)?;
                    moves.push(Move::new(staged, target));
                }
                moves
            }
        };
        // Displaced data lives in `staging` and goes away with it.
        move_all(&moves)?;

        let summary = CommitSummary {
            files: partitions.len(),
            rows: rows.len(),
        };
        info!(
            destination = %self.root.display(),
            family = %family,
            files = summary.files,
            rows = summary.rows,
            "committed file tree"
        );
        Ok(summary)
    }
}

fn create_parent(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Rewrite `staged` so it holds the rows of `target` followed by its own.
fn merge_existing(target: &Path, staged: &Path) -> Result<(), PipelineError> {
    let mut merged: Vec<Value> = Vec::new();
    for line in read_lines(target)?.into_iter().chain(read_lines(staged)?) {
        merged.push(serde_json::from_str(&line)?);
    }
    write_json_lines_gz(staged, &merged)?;
    Ok(())
}
