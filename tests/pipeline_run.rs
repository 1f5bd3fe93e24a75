use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde_json::Value;
use tempfile::{TempDir, tempdir};

use scantables::constants::output::UNSET_PARTITION_VALUE;
use scantables::transport::fs::FileStream;
use scantables::{
    Destination, ExportMode, FileTreeSink, InMemoryProvider, PipelineError, RunConfig, ScanFamily,
    Sink, SnapshotProviderFactory, TableSink, run_pipeline,
};

const DAY_ONE: &str = "CP_Quack-echo-2021-05-01-06-00-00";
const DAY_TWO: &str = "CP_Quack-echo-2021-05-02-06-00-00";

fn echo_line(server: &str) -> String {
    format!(
        r#"{{"Server":"{server}","Keyword":"example.com","Retries":0,"Blocked":false,"Success":true,"Results":[{{"Sent":"example.com","Received":"example.com","Success":true,"StartTime":"2021-05-01T06:00:00Z","EndTime":"2021-05-01T06:00:01Z"}}]}}"#
    )
}

fn write_source(input: &Path, source: &str, lines: &[String]) -> PathBuf {
    let dir = input.join("echo").join(source);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("results.json");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn write_snapshot(root: &Path, date: &str) {
    fs::create_dir_all(root).unwrap();
    let lines = [
        r#"{"netblock":"1.1.1.0/24","asn":13335,"as_name":"CLOUDFLARENET","country":"AU"}"#,
        r#"{"netblock":"8.8.8.0/24","asn":15169,"as_name":"GOOGLE","country":"US"}"#,
    ];
    fs::write(root.join(format!("{date}.jsonl")), lines.join("\n")).unwrap();
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn read_gz_rows(path: &Path) -> Vec<Value> {
    let reader = BufReader::new(MultiGzDecoder::new(fs::File::open(path).unwrap()));
    reader
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect()
}

struct Workspace {
    _dir: TempDir,
    input: PathBuf,
    metadata: PathBuf,
    output: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scans");
    let metadata = dir.path().join("metadata");
    let output = dir.path().join("export");
    write_snapshot(&metadata, "2021-04-30");
    Workspace {
        input,
        metadata,
        output,
        _dir: dir,
    }
}

#[test]
fn file_tree_export_partitions_by_source_and_country() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1"), echo_line("2.2.2.2")]);
    write_source(&ws.input, DAY_TWO, &[echo_line("8.8.8.8")]);

    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input)
        .with_partitions(3);
    let sink = FileTreeSink::new(&ws.output);
    let provider = SnapshotProviderFactory::dated(&ws.metadata);
    let summary = run_pipeline(&config, &FileStream::new(), &provider, &sink).unwrap();

    assert_eq!(summary.selected_files.len(), 2);
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.join.dates, 2);
    assert_eq!(summary.join.misses, 1);
    assert_eq!(summary.commit.as_ref().map(|commit| commit.files), Some(3));

    let family = ws.output.join("echo");
    let au = family
        .join(format!("source={DAY_ONE}"))
        .join("country=AU")
        .join("results.json.gz");
    let rows = read_gz_rows(&au);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["ip"], "1.1.1.1");
    assert_eq!(rows[0]["asn"], 13335);
    assert_eq!(rows[0]["as_name"], "CLOUDFLARENET");

    let unknown = family
        .join(format!("source={DAY_ONE}"))
        .join(format!("country={UNSET_PARTITION_VALUE}"))
        .join("results.json.gz");
    let rows = read_gz_rows(&unknown);
    assert_eq!(rows[0]["ip"], "2.2.2.2");
    assert!(rows[0].get("country").is_none());

    let us = family
        .join(format!("source={DAY_TWO}"))
        .join("country=US")
        .join("results.json.gz");
    assert_eq!(read_gz_rows(&us)[0]["date"], "2021-05-02");
}

#[test]
fn incremental_runs_only_load_new_sources() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1")]);

    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input);
    let sink = FileTreeSink::new(&ws.output);
    let provider = SnapshotProviderFactory::dated(&ws.metadata);
    let lister = FileStream::new();

    let first = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert_eq!(first.rows, 1);

    let second = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert!(second.selected_files.is_empty());
    assert!(second.commit.is_none());

    write_source(&ws.input, DAY_TWO, &[echo_line("1.1.1.1")]);
    let third = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert_eq!(third.selected_files.len(), 1);
    assert!(third.selected_files[0].contains(DAY_TWO));
    assert!(third.job_name.starts_with("append-"));
}

#[test]
fn table_runs_append_then_replace() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1"), echo_line("8.8.8.8")]);
    let table_dir = ws.output.join("base").join("echo_scan");
    let sink = TableSink::new(&table_dir);
    let provider = InMemoryProvider::new();
    let lister = FileStream::new();
    let incremental = RunConfig::new(ScanFamily::Echo, Destination::table_for("base", ScanFamily::Echo))
        .with_input_root(&ws.input);

    run_pipeline(&incremental, &lister, &provider, &sink).unwrap();
    let again = run_pipeline(&incremental, &lister, &provider, &sink).unwrap();
    assert!(again.commit.is_none());
    assert_eq!(sink.part_files().unwrap().len(), 1);

    write_source(&ws.input, DAY_TWO, &[echo_line("1.1.1.1")]);
    let full = incremental.clone().with_incremental(false);
    let replaced = run_pipeline(&full, &lister, &provider, &sink).unwrap();
    assert_eq!(replaced.rows, 3);
    assert!(replaced.job_name.starts_with("write-"));

    let parts = sink.part_files().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(read_gz_rows(&parts[0]).len(), 3);
    // Neither staging nor the replaced table is left behind.
    assert_eq!(dir_names(&ws.output.join("base")), vec!["echo_scan".to_string()]);
}

#[test]
fn file_tree_replace_twice_keeps_only_the_latest_rows() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1")]);
    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input)
        .with_incremental(false);
    let sink = FileTreeSink::new(&ws.output);
    let provider = SnapshotProviderFactory::dated(&ws.metadata);
    let lister = FileStream::new();

    let first = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert!(first.job_name.starts_with("write-"));
    write_source(&ws.input, DAY_TWO, &[echo_line("8.8.8.8")]);
    let second = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert_eq!(second.rows, 2);

    let family = ws.output.join("echo");
    let day_one = family
        .join(format!("source={DAY_ONE}"))
        .join("country=AU")
        .join("results.json.gz");
    assert_eq!(read_gz_rows(&day_one).len(), 1);
    let day_two = family
        .join(format!("source={DAY_TWO}"))
        .join("country=US")
        .join("results.json.gz");
    assert_eq!(read_gz_rows(&day_two).len(), 1);
    assert_eq!(dir_names(&ws.output), vec!["echo".to_string()]);
    assert_eq!(sink.existing_sources(ScanFamily::Echo).unwrap().len(), 2);
}

#[test]
fn failed_commit_leaves_the_destination_as_it_was() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1")]);
    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input);
    let sink = FileTreeSink::new(&ws.output);
    let provider = SnapshotProviderFactory::dated(&ws.metadata);
    let lister = FileStream::new();
    run_pipeline(&config, &lister, &provider, &sink).unwrap();

    // A directory squatting on one of the new partition files blocks the
    // commit; the other new partition must not land either.
    write_source(&ws.input, DAY_TWO, &[echo_line("1.1.1.1"), echo_line("2.2.2.2")]);
    let family = ws.output.join("echo");
    let day_two = family.join(format!("source={DAY_TWO}"));
    fs::create_dir_all(day_two.join("country=AU").join("results.json.gz")).unwrap();

    assert!(run_pipeline(&config, &lister, &provider, &sink).is_err());
    let day_one = family
        .join(format!("source={DAY_ONE}"))
        .join("country=AU")
        .join("results.json.gz");
    assert_eq!(read_gz_rows(&day_one).len(), 1);
    assert!(
        !day_two
            .join(format!("country={UNSET_PARTITION_VALUE}"))
            .join("results.json.gz")
            .exists()
    );
    assert_eq!(dir_names(&ws.output), vec!["echo".to_string()]);
    assert_eq!(
        sink.existing_sources(ScanFamily::Echo).unwrap().into_iter().collect::<Vec<_>>(),
        vec![DAY_ONE.to_string()]
    );

    fs::remove_dir_all(&day_two).unwrap();
    let retried = run_pipeline(&config, &lister, &provider, &sink).unwrap();
    assert_eq!(retried.rows, 2);
    assert_eq!(read_gz_rows(&day_one).len(), 1);
}

#[test]
fn mismatched_export_mode_is_rejected_before_any_work() {
    let ws = workspace();
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1")]);
    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_export_mode(ExportMode::Table)
        .with_input_root(&ws.input);
    let provider = InMemoryProvider::new();
    let err = run_pipeline(
        &config,
        &FileStream::new(),
        &provider,
        &FileTreeSink::new(&ws.output),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(provider.open_count(), 0);
    assert!(!ws.output.exists());
}

#[test]
fn selected_files_without_rows_fail_the_run() {
    let ws = workspace();
    write_source(
        &ws.input,
        DAY_ONE,
        &["this line is not json at all".to_string(), "{\"Server\": ".to_string()],
    );
    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input);
    let err = run_pipeline(
        &config,
        &FileStream::new(),
        &InMemoryProvider::new(),
        &FileTreeSink::new(&ws.output),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyOutput { files: 1 }));
    assert!(!ws.output.join("echo").exists());
}

#[test]
fn missing_snapshot_fails_without_writing() {
    let ws = workspace();
    let later = ws.metadata.parent().unwrap().join("later-metadata");
    write_snapshot(&later, "2021-06-01");
    write_source(&ws.input, DAY_ONE, &[echo_line("1.1.1.1")]);

    let config = RunConfig::new(ScanFamily::Echo, Destination::file_tree(&ws.output))
        .with_input_root(&ws.input);
    let err = run_pipeline(
        &config,
        &FileStream::new(),
        &SnapshotProviderFactory::dated(&later),
        &FileTreeSink::new(&ws.output),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::ProviderUnavailable { .. }));
    assert!(!ws.output.join("echo").exists());
}
