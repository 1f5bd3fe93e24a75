use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ScanFamily;
use crate::constants::output::{
    DISPLACED_DIR, STAGED_TABLE_DIR, STAGING_PREFIX, TABLE_PART_EXTENSION, TABLE_PART_PREFIX,
};
use crate::data::Row;
use crate::errors::PipelineError;
use crate::sink::{CommitSummary, Move, Sink, WriteMode, destination_error, move_all};
use crate::transport::fs::{files_under, read_lines, write_json_lines_gz};
use crate::types::SourceId;

/// A table stored as a directory of gzip JSON-lines part files.
#[derive(Clone, Debug)]
pub struct TableSink {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct SourceColumn {
    source: SourceId,
}

impl TableSink {
    /// Table stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the table's part files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Committed part files, sorted.
    pub fn part_files(&self) -> Result<Vec<PathBuf>, PipelineError> {
        files_under(&self.dir, is_part_file)
    }

    fn parent(&self) -> Result<&Path, PipelineError> {
        self.dir
            .parent()
            .ok_or_else(|| destination_error(&self.dir, "table directory has no parent"))
    }
}

fn is_part_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TABLE_PART_PREFIX) && name.ends_with(TABLE_PART_EXTENSION))
}

fn part_file_name() -> String {
    format!(
        "{TABLE_PART_PREFIX}{}-{:08x}.{TABLE_PART_EXTENSION}",
        Utc::now().format("%Y%m%dT%H%M%S%.3f"),
        rand::random::<u32>()
    )
}

impl Sink for TableSink {
    /// Distinct `source` values of every committed row.
    fn existing_sources(&self, _family: ScanFamily) -> Result<HashSet<SourceId>, PipelineError> {
        let mut sources = HashSet::new();
        for part in self.part_files()? {
            for line in read_lines(&part)? {
                match serde_json::from_str::<SourceColumn>(&line) {
                    Ok(column) => {
                        sources.insert(column.source);
                    }
                    Err(err) => {
                        warn!(part = %part.display(), error = %err, "skipping table row without a source");
                    }
                }
            }
        }
        Ok(sources)
    }

    fn commit(
        &self,
        family: ScanFamily,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<CommitSummary, PipelineError> {
        let parent = self.parent()?;
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;
        let staged_table = staging.path().join(STAGED_TABLE_DIR);
        let part_name = part_file_name();
        write_json_lines_gz(&staged_table.join(&part_name), rows)?;

        let moves = match mode {
            WriteMode::Replace => {
                let mut moves = Vec::with_capacity(2);
                if self.dir.exists() {
                    moves.push(Move::new(&self.dir, staging.path().join(DISPLACED_DIR)));
                }
                moves.push(Move::new(staged_table, &self.dir));
                moves
            }
            WriteMode::Append => {
                fs::create_dir_all(&self.dir)?;
                vec![Move::new(staged_table.join(&part_name), self.dir.join(&part_name))]
            }
        };
        // The replaced table, if any, is removed along with `staging`.
        move_all(&moves)?;

        let summary = CommitSummary {
            files: 1,
            rows: rows.len(),
        };
        info!(
            table = %self.dir.display(),
            family = %family,
            rows = summary.rows,
            "committed table part"
        );
        Ok(summary)
    }
}
