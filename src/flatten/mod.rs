//! Raw measurement lines to normalized rows.
//!
//! `flatten_line` is the single entry point: it parses one JSON line, assigns
//! a fresh measurement id, and dispatches to the probe or resolution
//! extractor based on the file path. Extractors are pure functions of
//! `(path context, record, measurement id)`.
//!
//! `flatten_files` works on a whole batch: resolution tag files are merged
//! onto the rows, then test resolutions are scored against their controls.

use std::path::Path;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde_json::Value;
use tracing::warn;

use crate::constants::flatten::{CONTROL_URLS, MALFORMED_LINE_MSG, RESOLUTION_PATH_COMPONENT};
use crate::data::Row;
use crate::errors::PipelineError;
use crate::source::indexing::date_helpers::{date_from_path, source_from_path};
use crate::transport::fs::read_lines;
use crate::types::{MeasurementId, SourceId};

/// Hyperquack outcome classification.
pub mod outcome;
mod probe;
mod resolution;
/// Resolver and answer tag files.
pub mod tags;

pub use outcome::classify_outcome;
pub use resolution::post_process;
pub use tags::ResolutionTags;

/// Fields every row of a file inherits from its path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathContext {
    /// Date stamp embedded in the path.
    pub date: NaiveDate,
    /// Name of the directory holding the file.
    pub source: SourceId,
    /// Probe scan type named in the path (`echo`, `discard`, `http`, `https`), if any.
    pub scan_type: &'static str,
}

impl PathContext {
    /// Context for `path`, or `None` when it carries no date stamp.
    pub fn from_path(path: &str) -> Option<Self> {
        Some(Self {
            date: date_from_path(path)?,
            source: source_from_path(path),
            scan_type: scan_type_from_path(path),
        })
    }
}

/// Probe scan type implied by `path`; empty when none is named.
fn scan_type_from_path(path: &str) -> &'static str {
    const PROBE_TYPES: [&str; 4] = ["https", "http", "discard", "echo"];
    let lower = path.to_ascii_lowercase();
    PROBE_TYPES
        .into_iter()
        .find(|scan_type| {
            lower.contains(&format!("/{scan_type}/")) || lower.contains(&format!("-{scan_type}-"))
                || lower.starts_with(&format!("{scan_type}/"))
        })
        .unwrap_or("")
}

/// Fresh random identifier grouping the rows of one raw line.
pub fn new_measurement_id() -> MeasurementId {
    format!("{:032x}", rand::random::<u128>())
}

/// True for the well-known control test domains.
pub fn is_control_url(url: Option<&str>) -> bool {
    url.is_some_and(|url| CONTROL_URLS.contains(&url))
}

/// Flatten one raw line from `path` into rows.
///
/// Malformed JSON is logged and yields no rows.
pub fn flatten_line(path: &str, line: &str) -> Vec<Row> {
    let record: Value = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(err) => {
            warn!(path, error = %err, line, MALFORMED_LINE_MSG);
            return Vec::new();
        }
    };
    flatten_record(path, &record, &new_measurement_id())
}

/// Flatten an already-parsed record with a caller-chosen measurement id.
pub fn flatten_record(path: &str, record: &Value, measurement_id: &str) -> Vec<Row> {
    let Some(context) = PathContext::from_path(path) else {
        warn!(path, "skipping measurement from a path without a date stamp");
        return Vec::new();
    };
    if path.contains(RESOLUTION_PATH_COMPONENT) {
        resolution::extract(&context, path, record, measurement_id)
    } else {
        probe::extract(&context, path, record, measurement_id)
    }
}

/// Read and flatten every line of one file.
pub fn flatten_file(path: &Path) -> Result<Vec<Row>, PipelineError> {
    let path_str = path.to_string_lossy();
    let rows = read_lines(path)?
        .iter()
        .flat_map(|line| flatten_line(&path_str, line))
        .collect();
    Ok(rows)
}

/// Flatten `paths` in parallel; any unreadable file fails the whole batch.
///
/// Tag files among `paths` yield no rows of their own. Their tags are merged
/// onto the resolution rows before [`post_process`] runs.
pub fn flatten_files(paths: &[String]) -> Result<Vec<Row>, PipelineError> {
    let (tag_files, data_files): (Vec<&str>, Vec<&str>) = paths
        .iter()
        .map(String::as_str)
        .partition(|path| tags::is_tag_file(path));
    let tags = ResolutionTags::load(&tag_files)?;
    let per_file = data_files
        .par_iter()
        .map(|path| flatten_file(Path::new(path)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut rows: Vec<Row> = per_file.into_iter().flatten().collect();
    tags.apply(&mut rows);
    post_process(&mut rows);
    Ok(rows)
}

pub(crate) fn value_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn value_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub(crate) fn value_u32(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|number| u32::try_from(number).ok())
}

/// Non-empty error string at `key`.
pub(crate) fn value_error(value: &Value, key: &str) -> Option<String> {
    value_str(value, key).filter(|error| !error.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO_PATH: &str = "echo/CP_Quack-echo-2020-08-23-06-01-02/results.json";

    #[test]
    fn malformed_line_yields_no_rows() {
        assert!(flatten_line(ECHO_PATH, "{not json").is_empty());
        assert!(flatten_line(ECHO_PATH, "[1, 2, 3]").is_empty());
    }

    #[test]
    fn measurement_ids_are_hex_and_distinct() {
        let a = new_measurement_id();
        let b = new_measurement_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn path_context_reads_date_source_and_scan_type() {
        let context = PathContext::from_path(ECHO_PATH).unwrap();
        assert_eq!(context.date, NaiveDate::from_ymd_opt(2020, 8, 23).unwrap());
        assert_eq!(context.source, "CP_Quack-echo-2020-08-23-06-01-02");
        assert_eq!(context.scan_type, "echo");
        let https = PathContext::from_path("x/https/CP_Quack-https-2021-01-01-01-01-01/results.json")
            .unwrap();
        assert_eq!(https.scan_type, "https");
        assert!(PathContext::from_path("echo/undated/results.json").is_none());
    }

    #[test]
    fn control_urls_are_recognised() {
        assert!(is_control_url(Some("www.example.com")));
        assert!(!is_control_url(Some("example.com")));
        assert!(!is_control_url(None));
    }
}
