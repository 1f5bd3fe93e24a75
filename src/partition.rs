use crate::config::ScanFamily;
use crate::constants::output::{
    COUNTRY_PARTITION_KEY, PARTITION_DELIMITER, PARTITION_FILE_NAME, SOURCE_PARTITION_KEY,
    UNSET_PARTITION_VALUE,
};
use crate::data::Row;
use crate::types::PartitionPath;

/// Relative output path for a joined row:
/// `<family>/source=<source>/country=<country>/results.json.gz`.
///
/// Rows without a country land in the hive default partition.
pub fn partition_path(family: ScanFamily, row: &Row) -> PartitionPath {
    let common = row.common();
    let country = common
        .metadata
        .country
        .as_deref()
        .filter(|country| !country.is_empty())
        .unwrap_or(UNSET_PARTITION_VALUE);
    let source = if common.source.is_empty() {
        UNSET_PARTITION_VALUE
    } else {
        common.source.as_str()
    };
    format!(
        "{family}/{SOURCE_PARTITION_KEY}{PARTITION_DELIMITER}{source}/{COUNTRY_PARTITION_KEY}{PARTITION_DELIMITER}{country}/{PARTITION_FILE_NAME}",
        family = family.as_str()
    )
}

/// Source id named by a `source=<id>` path component, if any.
pub fn source_from_partition(path: &str) -> Option<&str> {
    path.split('/').find_map(|component| {
        component
            .strip_prefix(SOURCE_PARTITION_KEY)
            .and_then(|rest| rest.strip_prefix(PARTITION_DELIMITER))
            .filter(|source| !source.is_empty() && *source != UNSET_PARTITION_VALUE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CommonFields, ProbeRow, Received};
    use chrono::NaiveDate;

    fn row(country: Option<&str>) -> Row {
        let mut common = CommonFields::new(
            NaiveDate::from_ymd_opt(2020, 8, 23).unwrap(),
            "CP_Quack-echo-2020-08-23-06-01-02",
            "example.com",
            "1.2.3.4",
            "m",
        );
        common.metadata.country = country.map(str::to_string);
        Row::Probe(ProbeRow {
            common,
            received: Received::default(),
            stateful_block: None,
            outcome: None,
        })
    }

    #[test]
    fn path_uses_family_source_and_country() {
        assert_eq!(
            partition_path(ScanFamily::Echo, &row(Some("US"))),
            "echo/source=CP_Quack-echo-2020-08-23-06-01-02/country=US/results.json.gz"
        );
    }

    #[test]
    fn unset_country_uses_default_partition() {
        assert_eq!(
            partition_path(ScanFamily::Echo, &row(None)),
            "echo/source=CP_Quack-echo-2020-08-23-06-01-02/country=__HIVE_DEFAULT_PARTITION__/results.json.gz"
        );
    }

    #[test]
    fn source_component_round_trips() {
        let path = partition_path(ScanFamily::Https, &row(Some("DE")));
        assert_eq!(source_from_partition(&path), Some("CP_Quack-echo-2020-08-23-06-01-02"));
        assert_eq!(source_from_partition("echo/country=US/results.json.gz"), None);
    }
}
