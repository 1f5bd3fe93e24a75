//! Deduplicated, date-scoped metadata join.
//!
//! The join runs in stages:
//! 1. Rows are routed to shards by a stable hash of their `JoinKey`.
//! 2. Each shard reduces its keys to a distinct set. Equal keys share a
//!    shard, so the union of the per-shard sets is exactly the distinct keys.
//! 3. Distinct keys are grouped by date and every date is looked up as one
//!    task holding a single provider handle, released when the date is done.
//! 4. Lookup results are routed with the same hash and merged onto the rows
//!    of their shard.
//!
//! Row count is preserved: a key the provider has nothing for leaves its
//! rows' metadata unset. A provider that cannot open for a date fails the
//! whole join.

use std::collections::HashMap;

use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use tracing::info;

use crate::constants::join::{DEFAULT_PARTITIONS, SHARD_SEED};
use crate::data::{JoinKey, Row};
use crate::errors::PipelineError;
use crate::metadata::MetadataRecord;
use crate::provider::{MetadataProviderFactory, ProviderCache};
use crate::types::IpString;

/// Hash routing shared by rows and lookup results.
pub mod shuffle;

use shuffle::route_by_key;

/// Counters describing one join.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Rows entering (and leaving) the join.
    pub rows: usize,
    /// Distinct `(date, ip)` keys, equal to the number of lookups issued.
    pub distinct_keys: usize,
    /// Distinct dates, equal to the number of provider handles opened.
    pub dates: usize,
    /// Keys the provider had no metadata for.
    pub misses: usize,
}

/// Sharded hash join of rows against a metadata provider.
#[derive(Clone, Debug)]
pub struct JoinEngine {
    partitions: usize,
    seed: u64,
}

impl Default for JoinEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl JoinEngine {
    /// Engine routing rows across `partitions` shards (at least one).
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            seed: SHARD_SEED,
        }
    }

    /// Override the routing seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Attach metadata to every row.
    pub fn join(
        &self,
        rows: Vec<Row>,
        factory: &dyn MetadataProviderFactory,
    ) -> Result<Vec<Row>, PipelineError> {
        self.join_with_stats(rows, factory).map(|(rows, _)| rows)
    }

    /// Attach metadata to every row and report what the join did.
    pub fn join_with_stats(
        &self,
        rows: Vec<Row>,
        factory: &dyn MetadataProviderFactory,
    ) -> Result<(Vec<Row>, JoinStats), PipelineError> {
        let row_count = rows.len();
        let shards = route_by_key(rows, self.seed, self.partitions, Row::join_key);

        let shard_keys: Vec<IndexSet<JoinKey>> = shards
            .par_iter()
            .map(|shard| shard.iter().map(Row::join_key).collect())
            .collect();
        let distinct_keys: usize = shard_keys.iter().map(IndexSet::len).sum();

        let by_date = group_by_date(shard_keys);
        let dates = by_date.len();

        let per_date: Vec<Vec<(JoinKey, Option<MetadataRecord>)>> = by_date
            .into_par_iter()
            .map_init(
                || ProviderCache::new(factory),
                |cache, (date, ips)| lookup_date(cache, date, ips),
            )
            .collect::<Result<Vec<_>, _>>()?;

        let mut misses = 0usize;
        let found: Vec<(JoinKey, MetadataRecord)> = per_date
            .into_iter()
            .flatten()
            .filter_map(|(key, record)| match record {
                Some(record) => Some((key, record)),
                None => {
                    misses += 1;
                    None
                }
            })
            .collect();

        let lookup_shards: Vec<HashMap<JoinKey, MetadataRecord>> =
            route_by_key(found, self.seed, self.partitions, |(key, _)| key.clone())
                .into_iter()
                .map(|shard| shard.into_iter().collect())
                .collect();

        let joined: Vec<Row> = shards
            .into_par_iter()
            .zip(lookup_shards.into_par_iter())
            .flat_map_iter(|(rows, lookups)| merge_shard(rows, lookups))
            .collect();

        let stats = JoinStats {
            rows: row_count,
            distinct_keys,
            dates,
            misses,
        };
        info!(
            rows = stats.rows,
            distinct_keys = stats.distinct_keys,
            dates = stats.dates,
            misses = stats.misses,
            "metadata join complete"
        );
        Ok((joined, stats))
    }
}

/// Distinct keys grouped by date, dates ascending.
fn group_by_date(shard_keys: Vec<IndexSet<JoinKey>>) -> Vec<(NaiveDate, Vec<IpString>)> {
    let mut by_date: IndexMap<NaiveDate, Vec<IpString>> = IndexMap::new();
    for key in shard_keys.into_iter().flatten() {
        by_date.entry(key.date).or_default().push(key.ip);
    }
    by_date.sort_keys();
    by_date.into_iter().collect()
}

/// Look up every ip of one date with a single handle, then release it.
fn lookup_date(
    cache: &mut ProviderCache<'_>,
    date: NaiveDate,
    ips: Vec<IpString>,
) -> Result<Vec<(JoinKey, Option<MetadataRecord>)>, PipelineError> {
    let mut results = Vec::with_capacity(ips.len());
    for ip in ips {
        let record = cache.lookup(date, &ip)?;
        results.push((JoinKey::new(date, ip), record));
    }
    cache.release(date);
    Ok(results)
}

fn merge_shard(rows: Vec<Row>, lookups: HashMap<JoinKey, MetadataRecord>) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            if let Some(record) = lookups.get(&row.join_key()) {
                row.apply_metadata(record);
            }
            row
        })
        .collect()
}
