use std::error::Error;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum, error::ErrorKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{DateWindow, Destination, ExportMode, RunConfig, ScanFamily};
use crate::constants::join::DEFAULT_PARTITIONS;
use crate::constants::output::DEFAULT_DATASET;
use crate::ingestion::IngestionManager;
use crate::provider::{MetadataProviderFactory, OrganizationChooser, SnapshotProviderFactory};
use crate::sink::sink_for;
use crate::transport::fs::FileStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScanTypeArg {
    Echo,
    Discard,
    Http,
    Https,
    Satellite,
    All,
}

impl ScanTypeArg {
    fn families(self) -> Vec<ScanFamily> {
        match self {
            ScanTypeArg::Echo => vec![ScanFamily::Echo],
            ScanTypeArg::Discard => vec![ScanFamily::Discard],
            ScanTypeArg::Http => vec![ScanFamily::Http],
            ScanTypeArg::Https => vec![ScanFamily::Https],
            ScanTypeArg::Satellite => vec![ScanFamily::Satellite],
            ScanTypeArg::All => ScanFamily::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "scantables",
    disable_help_subcommand = true,
    about = "Load measurement scans into tables",
    long_about = "Select new scan files, flatten them into rows, attach point-in-time IP metadata, and commit the rows to a table or a partitioned file tree.",
    after_help = "Runs are incremental unless --full is given. Set RUST_LOG to control log verbosity."
)]
/// CLI for `scantables`.
///
/// Common usage:
/// - Append new echo sources to `base.echo_scan`: `--scan-type echo --metadata-root ./meta`
/// - Rebuild every family: `--scan-type all --full --metadata-root ./meta`
/// - Export a partitioned tree instead of tables: `--export-files /tmp/export`
struct ScantablesCli {
    #[arg(long = "scan-type", value_enum, help = "Scan family to load, or all of them")]
    scan_type: ScanTypeArg,
    #[arg(long, help = "Replace existing data instead of appending new sources")]
    full: bool,
    #[arg(
        long = "start-date",
        value_name = "YYYY-MM-DD",
        value_parser = parse_date_arg,
        help = "Earliest source date to load (inclusive)"
    )]
    start_date: Option<NaiveDate>,
    #[arg(
        long = "end-date",
        value_name = "YYYY-MM-DD",
        value_parser = parse_date_arg,
        help = "Latest source date to load (inclusive)"
    )]
    end_date: Option<NaiveDate>,
    #[arg(
        long = "input-root",
        value_name = "PATH",
        default_value = ".",
        help = "Directory holding <family>/<source>/<datafile> inputs"
    )]
    input_root: PathBuf,
    #[arg(
        long = "metadata-root",
        value_name = "PATH",
        help = "Directory of dated netblock snapshots (<YYYY-MM-DD>.jsonl[.gz])"
    )]
    metadata_root: PathBuf,
    #[arg(
        long = "organization-file",
        value_name = "PATH",
        help = "Optional netblock organization table attached when AS numbers agree"
    )]
    organization_file: Option<PathBuf>,
    #[arg(
        long,
        default_value = DEFAULT_DATASET,
        help = "Dataset tables are written to"
    )]
    dataset: String,
    #[arg(
        long,
        value_name = "PATH",
        default_value = "warehouse",
        help = "Directory tables are stored under"
    )]
    warehouse: PathBuf,
    #[arg(
        long = "export-files",
        value_name = "DIR",
        help = "Write a partitioned file tree under DIR instead of tables"
    )]
    export_files: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = DEFAULT_PARTITIONS,
        value_parser = parse_positive_usize,
        help = "Number of shards the metadata join routes rows across"
    )]
    partitions: usize,
}

impl ScantablesCli {
    fn run_configs(&self) -> Vec<RunConfig> {
        let window = DateWindow::new(self.start_date, self.end_date);
        self.scan_type
            .families()
            .into_iter()
            .map(|family| {
                let (destination, export_mode) = match &self.export_files {
                    Some(dir) => (Destination::file_tree(dir.clone()), ExportMode::FileTree),
                    None => (Destination::table_for(&self.dataset, family), ExportMode::Table),
                };
                RunConfig::new(family, destination)
                    .with_export_mode(export_mode)
                    .with_incremental(!self.full)
                    .with_window(window)
                    .with_input_root(self.input_root.clone())
                    .with_partitions(self.partitions)
            })
            .collect()
    }

    fn provider(&self) -> Box<dyn MetadataProviderFactory> {
        let primary = SnapshotProviderFactory::dated(self.metadata_root.clone());
        match &self.organization_file {
            Some(path) => Box::new(OrganizationChooser::new(
                primary,
                SnapshotProviderFactory::fixed(path.clone()),
            )),
            None => Box::new(primary),
        }
    }
}

/// Run the `scantables` loader with `args_iter` (program name excluded).
pub fn run_scantables<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let Some(cli) =
        parse_cli::<ScantablesCli, _>(std::iter::once("scantables".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let configs = cli.run_configs();
    let lister = FileStream::new();
    let provider = cli.provider();
    let manager = IngestionManager::new(&lister, provider.as_ref());
    let results = manager.run_families(&configs, |config| sink_for(&config.destination, &cli.warehouse));

    let mut failures = 0usize;
    for (family, result) in &results {
        match result {
            Ok(summary) => info!(
                family = %family,
                job = %summary.job_name,
                files = summary.selected_files.len(),
                rows = summary.rows,
                "run finished"
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{family}: {err}");
            }
        }
    }
    if failures > 0 {
        return Err(format!("{failures} of {} runs failed", results.len()).into());
    }
    Ok(())
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Could not parse date '{raw}'; expected YYYY-MM-DD"))
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse --partitions value '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("--partitions must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
