use std::collections::HashSet;

use chrono::NaiveDate;

use scantables::constants::selection::EMPTY_GZIPPED_FILE_SIZE;
use scantables::{DateWindow, ObjectMeta, ScanFamily, select_files};

fn listing() -> Vec<ObjectMeta> {
    vec![
        ObjectMeta::new("echo/CP_Quack-echo-2021-04-30-00-00-00/results.json.gz", 500),
        ObjectMeta::new("echo/CP_Quack-echo-2021-05-01-00-00-00/results.json.gz", 800),
        ObjectMeta::new("echo/CP_Quack-echo-2021-05-01-00-00-00/stats.json.gz", 800),
        ObjectMeta::new("echo/CP_Quack-echo-2021-05-02-00-00-00/results.json", 120),
        ObjectMeta::new("echo/CP_Quack-echo-2021-05-03-00-00-00/results.json.gz", EMPTY_GZIPPED_FILE_SIZE),
        ObjectMeta::new("echo/CP_Quack-echo-2021-05-04-00-00-00/results.json.gz", 34),
        ObjectMeta::new("echo/undated/results.json.gz", 900),
    ]
}

fn date(day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2021, 5, day)
}

#[test]
fn selection_is_idempotent_and_sorted() {
    let listing = listing();
    let window = DateWindow::default();
    let ingested = HashSet::new();
    let first = select_files(ScanFamily::Echo, &listing, &window, &ingested);
    let second = select_files(ScanFamily::Echo, &listing, &window, &ingested);
    assert_eq!(first, second);
    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted);
    assert_eq!(first.len(), 4);
}

#[test]
fn empty_gzip_files_are_excluded() {
    let selected = select_files(
        ScanFamily::Echo,
        &listing(),
        &DateWindow::default(),
        &HashSet::new(),
    );
    assert!(!selected.iter().any(|path| path.contains("2021-05-03")));
    assert!(selected.iter().any(|path| path.contains("2021-05-04")));
}

#[test]
fn already_ingested_sources_are_excluded() {
    let ingested: HashSet<String> = ["CP_Quack-echo-2021-05-01-00-00-00".to_string()].into();
    let selected = select_files(ScanFamily::Echo, &listing(), &DateWindow::default(), &ingested);
    assert!(!selected.iter().any(|path| path.contains("2021-05-01")));
    assert_eq!(selected.len(), 3);
}

#[test]
fn window_bounds_are_inclusive() {
    let window = DateWindow::new(date(1), date(2));
    let selected = select_files(ScanFamily::Echo, &listing(), &window, &HashSet::new());
    assert_eq!(
        selected,
        vec![
            "echo/CP_Quack-echo-2021-05-01-00-00-00/results.json.gz".to_string(),
            "echo/CP_Quack-echo-2021-05-02-00-00-00/results.json".to_string(),
        ]
    );
}

#[test]
fn resolution_family_accepts_its_own_data_files() {
    let listing = vec![
        ObjectMeta::new("satellite/CP_Satellite-2021-05-01-00-00-00/results.json.gz", 400),
        ObjectMeta::new("satellite/CP_Satellite-2021-05-01-00-00-00/answers_control.json.gz", 400),
        ObjectMeta::new("satellite/CP_Satellite-2021-05-01-00-00-00/resolvers.json.gz", 400),
        ObjectMeta::new("satellite/CP_Satellite-2021-05-01-00-00-00/tagged_answers.json.gz", 400),
        ObjectMeta::new("satellite/CP_Satellite-2021-05-01-00-00-00/blockpages.json.gz", 400),
    ];
    let selected = select_files(
        ScanFamily::Satellite,
        &listing,
        &DateWindow::default(),
        &HashSet::new(),
    );
    assert_eq!(selected.len(), 4);
    assert!(selected.iter().any(|path| path.ends_with("resolvers.json.gz")));
    assert!(!selected.iter().any(|path| path.ends_with("blockpages.json.gz")));
}
