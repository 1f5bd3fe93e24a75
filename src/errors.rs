use std::io;

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{IpString, PathString};

/// Error type for configuration, provider, IO, and sink failures during a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("metadata provider for {date} is unavailable: {reason}")]
    ProviderUnavailable { date: NaiveDate, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("zero rows were created even though there were {files} new files")]
    EmptyOutput { files: usize },
    #[error("destination '{destination}' failed: {reason}")]
    Destination {
        destination: String,
        reason: String,
    },
    #[error("failed to list '{prefix}': {reason}")]
    Listing { prefix: PathString, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Error returned by a single metadata lookup.
///
/// A lookup error never aborts a run; the affected rows keep unset metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no metadata for ip '{ip}'")]
    NotFound { ip: IpString },
    #[error("'{ip}' is not an ip address")]
    InvalidAddress { ip: IpString },
}
