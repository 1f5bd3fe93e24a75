//! Metadata provider boundary.
//!
//! A `MetadataProviderFactory` opens one `ProviderHandle` per date. Opening
//! is expensive (it may load a whole day's netblock table), so callers hold
//! handles in a `ProviderCache` and reuse them for every lookup of that date.
//! Lookups themselves are cheap and may miss; a miss is never fatal.

use chrono::NaiveDate;

use crate::errors::{LookupError, PipelineError};
use crate::metadata::MetadataRecord;

mod cache;
mod chooser;
mod memory;
mod netblock;
mod snapshot;

pub use cache::ProviderCache;
pub use chooser::OrganizationChooser;
pub use memory::InMemoryProvider;
pub use netblock::NetblockTable;
pub use snapshot::SnapshotProviderFactory;

/// Lookup capability for a single date.
///
/// A handle is used by one worker at a time, so it only needs to be `Send`.
pub trait ProviderHandle: Send {
    /// Metadata for `ip`, or `LookupError::NotFound` when nothing covers it.
    fn lookup(&self, ip: &str) -> Result<MetadataRecord, LookupError>;
}

/// Opens per-date lookup handles.
pub trait MetadataProviderFactory: Send + Sync {
    /// Handle for `date`; failure to open is fatal for the run.
    fn for_date(&self, date: NaiveDate) -> Result<Box<dyn ProviderHandle>, PipelineError>;
}

impl<T: MetadataProviderFactory + ?Sized> MetadataProviderFactory for std::sync::Arc<T> {
    fn for_date(&self, date: NaiveDate) -> Result<Box<dyn ProviderHandle>, PipelineError> {
        (**self).for_date(date)
    }
}
