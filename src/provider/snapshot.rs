use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use tracing::info;

use crate::constants::provider::SNAPSHOT_EXTENSION;
use crate::constants::selection::GZIP_SUFFIX;
use crate::errors::PipelineError;
use crate::provider::{MetadataProviderFactory, NetblockTable, ProviderHandle};
use crate::transport::fs::read_lines;

/// Provider backed by netblock snapshot files.
///
/// In dated mode the root holds `<YYYY-MM-DD>.jsonl[.gz]` files and a date
/// uses the newest snapshot taken on or before it. In fixed mode one file
/// serves every date and is loaded once.
pub struct SnapshotProviderFactory {
    source: SnapshotSource,
}

enum SnapshotSource {
    Dated { root: PathBuf },
    Fixed {
        path: PathBuf,
        table: OnceLock<Arc<NetblockTable>>,
    },
}

impl SnapshotProviderFactory {
    /// Per-date snapshots under `root`.
    pub fn dated(root: impl Into<PathBuf>) -> Self {
        Self {
            source: SnapshotSource::Dated { root: root.into() },
        }
    }

    /// A single snapshot file used for every date.
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self {
            source: SnapshotSource::Fixed {
                path: path.into(),
                table: OnceLock::new(),
            },
        }
    }

    /// Snapshot file a dated factory would open for `date`.
    pub fn snapshot_for(root: &Path, date: NaiveDate) -> Result<PathBuf, PipelineError> {
        let unavailable = |reason: String| PipelineError::ProviderUnavailable { date, reason };
        let entries = fs::read_dir(root)
            .map_err(|err| unavailable(format!("cannot read {}: {err}", root.display())))?;
        let mut best: Option<(NaiveDate, PathBuf)> = None;
        for entry in entries {
            let path = entry
                .map_err(|err| unavailable(err.to_string()))?
                .path();
            let Some(taken) = snapshot_date(&path) else {
                continue;
            };
            if taken > date {
                continue;
            }
            if best.as_ref().is_none_or(|(current, _)| taken > *current) {
                best = Some((taken, path));
            }
        }
        best.map(|(_, path)| path)
            .ok_or_else(|| unavailable(format!("no snapshot on or before {date} in {}", root.display())))
    }
}

/// Date encoded in a snapshot filename, if it is one.
fn snapshot_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(GZIP_SUFFIX).unwrap_or(name);
    let stem = name.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

fn load_table(path: &Path, date: NaiveDate) -> Result<NetblockTable, PipelineError> {
    let lines = read_lines(path).map_err(|err| PipelineError::ProviderUnavailable {
        date,
        reason: format!("cannot read {}: {err}", path.display()),
    })?;
    let table = NetblockTable::from_json_lines(lines);
    info!(
        snapshot = %path.display(),
        netblocks = table.len(),
        "loaded netblock snapshot"
    );
    Ok(table)
}

impl MetadataProviderFactory for SnapshotProviderFactory {
    fn for_date(&self, date: NaiveDate) -> Result<Box<dyn ProviderHandle>, PipelineError> {
        match &self.source {
            SnapshotSource::Dated { root } => {
                let path = Self::snapshot_for(root, date)?;
                Ok(Box::new(load_table(&path, date)?))
            }
            SnapshotSource::Fixed { path, table } => {
                if let Some(loaded) = table.get() {
                    return Ok(Box::new(Arc::clone(loaded)));
                }
                let loaded = Arc::new(load_table(path, date)?);
                let shared = table.get_or_init(|| loaded);
                Ok(Box::new(Arc::clone(shared)))
            }
        }
    }
}
