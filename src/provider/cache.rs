use chrono::NaiveDate;
use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::debug;

use crate::constants::provider::LOOKUP_MISS_MSG;
use crate::errors::PipelineError;
use crate::metadata::MetadataRecord;
use crate::provider::{MetadataProviderFactory, ProviderHandle};

/// Per-worker cache of open provider handles keyed by date.
///
/// A handle is opened on the first lookup for its date and kept until
/// `release` (or until the cache is dropped).
pub struct ProviderCache<'a> {
    factory: &'a dyn MetadataProviderFactory,
    handles: IndexMap<NaiveDate, Box<dyn ProviderHandle>>,
    opened: usize,
}

impl<'a> ProviderCache<'a> {
    /// Empty cache over `factory`.
    pub fn new(factory: &'a dyn MetadataProviderFactory) -> Self {
        Self {
            factory,
            handles: IndexMap::new(),
            opened: 0,
        }
    }

    /// Handle for `date`, opening it if needed.
    pub fn handle(&mut self, date: NaiveDate) -> Result<&dyn ProviderHandle, PipelineError> {
        let factory = self.factory;
        let handle = match self.handles.entry(date) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let handle = factory.for_date(date)?;
                self.opened += 1;
                entry.insert(handle)
            }
        };
        Ok(&**handle)
    }

    /// Metadata for `(date, ip)`; `None` when the provider has nothing for the ip.
    pub fn lookup(&mut self, date: NaiveDate, ip: &str) -> Result<Option<MetadataRecord>, PipelineError> {
        match self.handle(date)?.lookup(ip) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                debug!(date = %date, ip, error = %err, LOOKUP_MISS_MSG);
                Ok(None)
            }
        }
    }

    /// Close the handle for `date`, if open.
    pub fn release(&mut self, date: NaiveDate) {
        self.handles.shift_remove(&date);
    }

    /// Number of dates with an open handle.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Handles opened over the cache's lifetime.
    pub fn opened(&self) -> usize {
        self.opened
    }
}
