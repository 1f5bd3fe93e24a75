//! Run orchestration: select, flatten, join, commit.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{RunConfig, ScanFamily};
use crate::constants::selection::NO_NEW_FILES_MSG;
use crate::errors::PipelineError;
use crate::flatten::flatten_files;
use crate::join::{JoinEngine, JoinStats};
use crate::metrics::{source_row_counts, source_skew};
use crate::provider::MetadataProviderFactory;
use crate::sink::{CommitSummary, Sink, WriteMode};
use crate::source::{ObjectLister, select_from_lister};
use crate::types::{PathString, SourceId};

/// What one run did.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Family the run ingested.
    pub family: ScanFamily,
    /// `append-…` or `write-…` name of the run.
    pub job_name: String,
    /// Files chosen by selection.
    pub selected_files: Vec<PathString>,
    /// Rows flattened (and committed) by the run.
    pub rows: usize,
    /// Join counters; default when nothing was selected.
    pub join: JoinStats,
    /// Commit result; `None` when there was nothing new to load.
    pub commit: Option<CommitSummary>,
}

/// Wires a listing, a metadata provider, and a sink into runs.
pub struct IngestionManager<'a> {
    lister: &'a dyn ObjectLister,
    factory: &'a dyn MetadataProviderFactory,
}

impl<'a> IngestionManager<'a> {
    /// Manager over `lister` and `factory`.
    pub fn new(lister: &'a dyn ObjectLister, factory: &'a dyn MetadataProviderFactory) -> Self {
        Self { lister, factory }
    }

    /// Run one family end to end, committing to `sink`.
    ///
    /// Nothing is written unless every stage succeeds.
    pub fn run(&self, config: &RunConfig, sink: &dyn Sink) -> Result<RunSummary, PipelineError> {
        config.validate()?;
        let job_name = config.job_name();

        let already_ingested: HashSet<SourceId> = if config.incremental {
            sink.existing_sources(config.family)?
        } else {
            HashSet::new()
        };
        let selected = select_from_lister(
            self.lister,
            &config.family_root(),
            config.family,
            &config.window,
            &already_ingested,
        )?;
        if selected.is_empty() {
            info!(job = %job_name, family = %config.family, NO_NEW_FILES_MSG);
            return Ok(RunSummary {
                family: config.family,
                job_name,
                selected_files: selected,
                rows: 0,
                join: JoinStats::default(),
                commit: None,
            });
        }
        info!(
            job = %job_name,
            files = selected.len(),
            skipped_sources = already_ingested.len(),
            "selected source files"
        );

        let rows = flatten_files(&selected)?;
        let (joined, join) =
            JoinEngine::new(config.partitions).join_with_stats(rows, self.factory)?;
        if joined.is_empty() {
            return Err(PipelineError::EmptyOutput {
                files: selected.len(),
            });
        }

        if let Some(skew) = source_skew(&source_row_counts(&joined)) {
            info!(
                job = %job_name,
                sources = skew.sources,
                min_rows = skew.min,
                max_rows = skew.max,
                max_share = skew.max_share,
                "rows per source"
            );
        }

        let commit = sink.commit(
            config.family,
            &joined,
            WriteMode::for_incremental(config.incremental),
        )?;
        Ok(RunSummary {
            family: config.family,
            job_name,
            selected_files: selected,
            rows: joined.len(),
            join,
            commit: Some(commit),
        })
    }

    /// Run several families in parallel, each against the sink `sink_for` picks.
    ///
    /// Every family runs to completion or failure independently; results are
    /// returned in input order.
    pub fn run_families<F>(
        &self,
        configs: &[RunConfig],
        sink_for: F,
    ) -> Vec<(ScanFamily, Result<RunSummary, PipelineError>)>
    where
        F: Fn(&RunConfig) -> Box<dyn Sink> + Sync,
    {
        configs
            .par_iter()
            .map(|config| {
                let sink = sink_for(config);
                let result = self.run(config, sink.as_ref());
                if let Err(err) = &result {
                    warn!(family = %config.family, error = %err, "run failed");
                }
                (config.family, result)
            })
            .collect()
    }
}

/// Run one family with a fresh manager.
pub fn run_pipeline(
    config: &RunConfig,
    lister: &dyn ObjectLister,
    factory: &dyn MetadataProviderFactory,
    sink: &dyn Sink,
) -> Result<RunSummary, PipelineError> {
    IngestionManager::new(lister, factory).run(config, sink)
}
