#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line entry point shared by the `scantables` binary.
pub mod cli;
/// Scan families, destinations, and run configuration.
pub mod config;
/// Centralized constants used across selection, flattening, and output.
pub mod constants;
/// Normalized row and join key types.
pub mod data;
/// Raw measurement flattening and outcome classification.
pub mod flatten;
mod hash;
/// Run orchestration.
pub mod ingestion;
/// Deduplicated metadata join.
pub mod join;
/// IP metadata record.
pub mod metadata;
/// Aggregate metrics helpers.
pub mod metrics;
/// Output partition planning.
pub mod partition;
/// Metadata provider boundary and built-in providers.
pub mod provider;
/// Row destinations.
pub mod sink;
/// Input listing and source-file selection.
pub mod source;
/// Input transports (local filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{DateWindow, Destination, ExportMode, RunConfig, ScanFamily, ScanStyle};
pub use data::{
    CommonFields, JoinKey, ProbeRow, Received, ResolutionRow, ResolvedAnswer, Row,
};
pub use errors::{LookupError, PipelineError};
pub use flatten::{flatten_line, flatten_record};
pub use ingestion::{IngestionManager, RunSummary, run_pipeline};
pub use join::{JoinEngine, JoinStats};
pub use metadata::MetadataRecord;
pub use partition::partition_path;
pub use provider::{
    InMemoryProvider, MetadataProviderFactory, OrganizationChooser, ProviderCache, ProviderHandle,
    SnapshotProviderFactory,
};
pub use sink::{FileTreeSink, Sink, TableSink, WriteMode};
pub use source::{InMemoryLister, ObjectLister, ObjectMeta, select_files};
pub use types::{IpString, MeasurementId, PathString, SourceId};
