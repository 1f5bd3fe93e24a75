use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use crate::errors::{LookupError, PipelineError};
use crate::metadata::MetadataRecord;
use crate::provider::{MetadataProviderFactory, ProviderHandle};
use crate::types::IpString;

type DayTable = Arc<HashMap<IpString, MetadataRecord>>;

/// Provider backed by in-memory per-date tables, for tests and small runs.
///
/// Counts handle opens and lookups so callers can check how often the
/// provider was consulted.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    days: HashMap<NaiveDate, DayTable>,
    unavailable: HashSet<NaiveDate>,
    opens: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryProvider {
    /// Provider that knows nothing; every date opens and every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `record` for `ip` on `date`.
    pub fn with_record(mut self, date: NaiveDate, ip: impl Into<IpString>, record: MetadataRecord) -> Self {
        let table = self.days.entry(date).or_default();
        Arc::make_mut(table).insert(ip.into(), record);
        self
    }

    /// Make opening `date` fail.
    pub fn with_unavailable(mut self, date: NaiveDate) -> Self {
        self.unavailable.insert(date);
        self
    }

    /// Handles opened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Lookups served so far, across every handle.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MetadataProviderFactory for InMemoryProvider {
    fn for_date(&self, date: NaiveDate) -> Result<Box<dyn ProviderHandle>, PipelineError> {
        if self.unavailable.contains(&date) {
            return Err(PipelineError::ProviderUnavailable {
                date,
                reason: "marked unavailable".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryHandle {
            table: self.days.get(&date).cloned().unwrap_or_default(),
            lookups: Arc::clone(&self.lookups),
        }))
    }
}

struct InMemoryHandle {
    table: DayTable,
    lookups: Arc<AtomicUsize>,
}

impl ProviderHandle for InMemoryHandle {
    fn lookup(&self, ip: &str) -> Result<MetadataRecord, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(ip)
            .cloned()
            .ok_or_else(|| LookupError::NotFound { ip: ip.to_string() })
    }
}
