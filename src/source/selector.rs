use std::collections::HashSet;

use tracing::debug;

use crate::config::{DateWindow, ScanFamily};
use crate::constants::selection::{EMPTY_GZIPPED_FILE_SIZE, SKIP_UNDATED_MSG};
use crate::source::ObjectMeta;
use crate::source::indexing::date_helpers::{data_filename, date_from_path, source_from_path};
use crate::types::{PathString, SourceId};

/// Paths from `listing` this run should process, sorted.
///
/// Filters, in order: date window, family data filename, already-ingested
/// source (pass an empty set for full runs), and minimum non-empty size.
pub fn select_files(
    family: ScanFamily,
    listing: &[ObjectMeta],
    window: &DateWindow,
    already_ingested: &HashSet<SourceId>,
) -> Vec<PathString> {
    let expected = family.data_filenames();
    let mut selected: Vec<PathString> = listing
        .iter()
        .filter(|object| match date_from_path(&object.path) {
            Some(date) => window.contains(date),
            None => {
                debug!(path = %object.path, SKIP_UNDATED_MSG);
                false
            }
        })
        .filter(|object| {
            data_filename(&object.path).is_some_and(|name| expected.contains(&name))
        })
        .filter(|object| !already_ingested.contains(&source_from_path(&object.path)))
        .filter(|object| object.size > EMPTY_GZIPPED_FILE_SIZE)
        .map(|object| object.path.clone())
        .collect();
    selected.sort();
    selected.dedup();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn listing() -> Vec<ObjectMeta> {
        vec![
            ObjectMeta::new("echo/CP_Quack-echo-2020-08-23-06-01-02/results.json.gz", 500),
            ObjectMeta::new("echo/CP_Quack-echo-2020-08-24-06-01-02/results.json", 500),
            ObjectMeta::new("echo/CP_Quack-echo-2020-08-24-06-01-02/resolvers.json", 500),
            ObjectMeta::new("echo/CP_Quack-echo-2020-08-25-06-01-02/results.json.gz", 33),
            ObjectMeta::new("echo/undated/results.json", 500),
        ]
    }

    #[test]
    fn filters_name_size_and_date_stamp() {
        let selected = select_files(
            ScanFamily::Echo,
            &listing(),
            &DateWindow::default(),
            &HashSet::new(),
        );
        assert_eq!(
            selected,
            vec![
                "echo/CP_Quack-echo-2020-08-23-06-01-02/results.json.gz".to_string(),
                "echo/CP_Quack-echo-2020-08-24-06-01-02/results.json".to_string(),
            ]
        );
    }

    #[test]
    fn resolution_family_accepts_all_its_data_files() {
        let listing = vec![
            ObjectMeta::new("Satellite/CP_Satellite-2021-03-01-12-00-01/results.json.gz", 90),
            ObjectMeta::new("Satellite/CP_Satellite-2021-03-01-12-00-01/interference.json.gz", 90),
            ObjectMeta::new("Satellite/CP_Satellite-2021-03-01-12-00-01/answers_control.json.gz", 90),
            ObjectMeta::new("Satellite/CP_Satellite-2021-03-01-12-00-01/resolvers.json.gz", 90),
            ObjectMeta::new("Satellite/CP_Satellite-2021-03-01-12-00-01/blockpages.json.gz", 90),
        ];
        let selected = select_files(
            ScanFamily::Satellite,
            &listing,
            &DateWindow::default(),
            &HashSet::new(),
        );
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|path| !path.contains("blockpages")));
    }

    #[test]
    fn window_and_ingested_sources_exclude_paths() {
        let window = DateWindow::new(NaiveDate::from_ymd_opt(2020, 8, 24), None);
        let selected = select_files(ScanFamily::Echo, &listing(), &window, &HashSet::new());
        assert_eq!(selected.len(), 1);

        let ingested: HashSet<SourceId> =
            ["CP_Quack-echo-2020-08-23-06-01-02".to_string()].into_iter().collect();
        let selected = select_files(ScanFamily::Echo, &listing(), &DateWindow::default(), &ingested);
        assert_eq!(
            selected,
            vec!["echo/CP_Quack-echo-2020-08-24-06-01-02/results.json".to_string()]
        );
    }
}
