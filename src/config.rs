use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;

use crate::constants::join::DEFAULT_PARTITIONS;
use crate::constants::output::{BASE_TABLE_NAME, FILE_TREE_SCHEME};
use crate::constants::selection::{PROBE_DATA_FILES, RESOLUTION_DATA_FILES};
use crate::errors::PipelineError;

/// Scan family a run ingests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScanFamily {
    /// TCP echo probes.
    Echo,
    /// TCP discard probes.
    Discard,
    /// Plain HTTP probes.
    Http,
    /// HTTPS probes.
    Https,
    /// DNS resolution scans.
    Satellite,
}

/// How a family's raw records are shaped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStyle {
    /// One row per protocol attempt.
    Probe,
    /// One row per DNS answer.
    Resolution,
}

impl ScanFamily {
    /// Every family, in the order `all` runs them.
    pub const ALL: [ScanFamily; 5] = [
        ScanFamily::Echo,
        ScanFamily::Discard,
        ScanFamily::Http,
        ScanFamily::Https,
        ScanFamily::Satellite,
    ];

    /// Lower-case name used in paths and table names.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanFamily::Echo => "echo",
            ScanFamily::Discard => "discard",
            ScanFamily::Http => "http",
            ScanFamily::Https => "https",
            ScanFamily::Satellite => "satellite",
        }
    }

    /// Record style produced by this family.
    pub const fn style(&self) -> ScanStyle {
        match self {
            ScanFamily::Satellite => ScanStyle::Resolution,
            _ => ScanStyle::Probe,
        }
    }

    /// Data filenames (without compression suffix) that hold this family's measurements.
    pub const fn data_filenames(&self) -> &'static [&'static str] {
        match self.style() {
            ScanStyle::Probe => PROBE_DATA_FILES,
            ScanStyle::Resolution => RESOLUTION_DATA_FILES,
        }
    }
}

impl fmt::Display for ScanFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanFamily {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScanFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == value)
            .ok_or_else(|| PipelineError::Configuration(format!("unknown scan type '{value}'")))
    }
}

/// Inclusive date window; an absent bound is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateWindow {
    /// First date included.
    pub start: Option<NaiveDate>,
    /// Last date included.
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    /// Window with both bounds given.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// True when `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Kind of store rows are committed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// Rows go to a named table under a warehouse root.
    Table,
    /// Rows go to a partitioned tree of gzip JSON-lines files.
    FileTree,
}

/// Where a run commits its rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// `file://<dir>` destinations.
    FileTree { root: PathBuf },
    /// `<dataset>.<table>` destinations.
    Table { dataset: String, table: String },
}

impl Destination {
    /// Parse `file://<dir>` or `<dataset>.<table>`.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        if let Some(root) = value.strip_prefix(FILE_TREE_SCHEME) {
            if root.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "file destination '{value}' has no directory"
                )));
            }
            return Ok(Destination::FileTree {
                root: PathBuf::from(root),
            });
        }
        match value.split_once('.') {
            Some((dataset, table))
                if !dataset.is_empty() && !table.is_empty() && !table.contains('.') =>
            {
                Ok(Destination::Table {
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(PipelineError::Configuration(format!(
                "destination '{value}' is neither {FILE_TREE_SCHEME}<dir> nor <dataset>.<table>"
            ))),
        }
    }

    /// File-tree destination rooted at `root`.
    pub fn file_tree(root: impl Into<PathBuf>) -> Self {
        Destination::FileTree { root: root.into() }
    }

    /// Table destination named `<dataset>.<family>_scan`.
    pub fn table_for(dataset: &str, family: ScanFamily) -> Self {
        Destination::Table {
            dataset: dataset.to_string(),
            table: format!("{}_{}", family.as_str(), BASE_TABLE_NAME),
        }
    }

    /// Export mode this destination is valid for.
    pub fn export_mode(&self) -> ExportMode {
        match self {
            Destination::FileTree { .. } => ExportMode::FileTree,
            Destination::Table { .. } => ExportMode::Table,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::FileTree { root } => write!(f, "{FILE_TREE_SCHEME}{}", root.display()),
            Destination::Table { dataset, table } => write!(f, "{dataset}.{table}"),
        }
    }
}

/// Immutable parameters for one run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Family being ingested.
    pub family: ScanFamily,
    /// Skip sources already present at the destination.
    pub incremental: bool,
    /// Inclusive window on source dates.
    pub window: DateWindow,
    /// Where rows are committed.
    pub destination: Destination,
    /// Requested export mode; must agree with `destination`.
    pub export_mode: ExportMode,
    /// Root holding `<family>/<source>/<datafile>` inputs.
    pub input_root: PathBuf,
    /// Number of shards the join routes rows across.
    pub partitions: usize,
}

impl RunConfig {
    /// Incremental, unbounded run with the export mode implied by `destination`.
    pub fn new(family: ScanFamily, destination: Destination) -> Self {
        let export_mode = destination.export_mode();
        Self {
            family,
            incremental: true,
            window: DateWindow::default(),
            destination,
            export_mode,
            input_root: PathBuf::from("."),
            partitions: DEFAULT_PARTITIONS,
        }
    }

    /// Toggle incremental ingestion (`false` replaces the destination).
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Restrict sources to an inclusive date window.
    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    /// Override the export mode.
    pub fn with_export_mode(mut self, export_mode: ExportMode) -> Self {
        self.export_mode = export_mode;
        self
    }

    /// Root directory inputs are listed from.
    pub fn with_input_root(mut self, input_root: impl Into<PathBuf>) -> Self {
        self.input_root = input_root.into();
        self
    }

    /// Number of join shards.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Directory holding this family's inputs.
    pub fn family_root(&self) -> PathBuf {
        self.input_root.join(self.family.as_str())
    }

    /// Reject configurations that cannot run before any input is read.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match (self.export_mode, self.destination.export_mode()) {
            (ExportMode::FileTree, ExportMode::Table) => {
                return Err(PipelineError::Configuration(format!(
                    "file export requires a {FILE_TREE_SCHEME} destination, got '{}'",
                    self.destination
                )));
            }
            (ExportMode::Table, ExportMode::FileTree) => {
                return Err(PipelineError::Configuration(format!(
                    "table export cannot write to file destination '{}'",
                    self.destination
                )));
            }
            _ => {}
        }
        if self.partitions == 0 {
            return Err(PipelineError::Configuration(
                "partitions must be at least 1".to_string(),
            ));
        }
        if let DateWindow {
            start: Some(start),
            end: Some(end),
        } = self.window
            && start > end
        {
            return Err(PipelineError::Configuration(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(())
    }

    /// Job name derived from the destination and load kind.
    pub fn job_name(&self) -> String {
        job_name(&self.destination.to_string(), self.incremental)
    }
}

/// Table name `<dataset>.<family>_<base>`.
pub fn table_name(dataset: &str, family: ScanFamily, base: &str) -> String {
    format!("{dataset}.{}_{base}", family.as_str())
}

/// `append-<name>` for incremental loads, `write-<name>` for full loads.
///
/// Separators in `destination` become `-` so the result is a valid job identifier.
pub fn job_name(destination: &str, incremental: bool) -> String {
    let prefix = if incremental { "append" } else { "write" };
    let trimmed = destination
        .strip_prefix(FILE_TREE_SCHEME)
        .unwrap_or(destination);
    let name: String = trimmed
        .trim_matches('/')
        .chars()
        .map(|c| match c {
            '_' | '.' | '/' => '-',
            other => other,
        })
        .collect();
    format!("{prefix}-{name}")
}

/// Resolve a table destination to its directory under `warehouse`.
pub fn table_dir(warehouse: &Path, dataset: &str, table: &str) -> PathBuf {
    warehouse.join(dataset).join(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = DateWindow::new(Some(date(2021, 1, 1)), Some(date(2021, 1, 31)));
        assert!(window.contains(date(2021, 1, 1)));
        assert!(window.contains(date(2021, 1, 31)));
        assert!(!window.contains(date(2020, 12, 31)));
        assert!(!window.contains(date(2021, 2, 1)));
        assert!(DateWindow::default().contains(date(1999, 1, 1)));
    }

    #[test]
    fn destinations_parse_by_shape() {
        assert_eq!(
            Destination::parse("file:///tmp/out").unwrap(),
            Destination::file_tree("/tmp/out")
        );
        assert_eq!(
            Destination::parse("base.echo_scan").unwrap(),
            Destination::table_for("base", ScanFamily::Echo)
        );
        assert!(Destination::parse("no_dot_here").is_err());
        assert!(Destination::parse("a.b.c").is_err());
        assert!(Destination::parse("file://").is_err());
    }

    #[test]
    fn export_mode_must_match_destination() {
        let config = RunConfig::new(ScanFamily::Echo, Destination::table_for("base", ScanFamily::Echo))
            .with_export_mode(ExportMode::FileTree);
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree("/tmp/x"))
            .with_export_mode(ExportMode::Table);
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree("/tmp/x"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_window_and_zero_partitions_are_rejected() {
        let config = RunConfig::new(ScanFamily::Http, Destination::file_tree("/tmp/x"))
            .with_window(DateWindow::new(Some(date(2021, 2, 1)), Some(date(2021, 1, 1))));
        assert!(config.validate().is_err());
        let config =
            RunConfig::new(ScanFamily::Http, Destination::file_tree("/tmp/x")).with_partitions(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn names_follow_family_and_load_kind() {
        assert_eq!(table_name("base", ScanFamily::Echo, "scan"), "base.echo_scan");
        assert_eq!(job_name("base.echo_scan", true), "append-base-echo-scan");
        assert_eq!(job_name("file:///tmp/out_dir", false), "write-tmp-out-dir");
        assert_eq!("satellite".parse::<ScanFamily>().unwrap(), ScanFamily::Satellite);
        assert!("dns".parse::<ScanFamily>().is_err());
    }
}
