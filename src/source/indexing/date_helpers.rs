use std::path::Path;

use chrono::NaiveDate;

use crate::constants::selection::GZIP_SUFFIX;
use crate::types::SourceId;

const DATE_STAMP_LEN: usize = 10;

/// Parse the first `YYYY-MM-DD` stamp embedded anywhere in `path`.
///
/// Only the first substring shaped like a stamp is considered; returns `None`
/// when there is no such substring or it is not a real calendar date.
pub fn date_from_path(path: &str) -> Option<NaiveDate> {
    let bytes = path.as_bytes();
    if bytes.len() < DATE_STAMP_LEN {
        return None;
    }
    let start = (0..=bytes.len() - DATE_STAMP_LEN)
        .find(|&idx| is_date_stamp(&bytes[idx..idx + DATE_STAMP_LEN]))?;
    NaiveDate::parse_from_str(&path[start..start + DATE_STAMP_LEN], "%Y-%m-%d").ok()
}

fn is_date_stamp(window: &[u8]) -> bool {
    window.iter().enumerate().all(|(idx, byte)| match idx {
        4 | 7 => *byte == b'-',
        _ => byte.is_ascii_digit(),
    })
}

/// Name of the directory that holds the data file.
///
/// For `echo/CP_Quack-echo-2020-08-23-06-01-02/results.json` this is
/// `CP_Quack-echo-2020-08-23-06-01-02`.
pub fn source_from_path(path: &str) -> SourceId {
    Path::new(path)
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Terminal filename with any `.gz` suffix removed.
pub fn data_filename(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().filter(|name| !name.is_empty())?;
    Some(name.strip_suffix(GZIP_SUFFIX).unwrap_or(name))
}
