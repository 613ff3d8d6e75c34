//! Per-operation metrics and tracing for [`Store`](crate::Store) methods.
//!
//! Each operation gets three Prometheus series named
//! `src_repoupdater_store_<op>_{total,duration_seconds,errors_total}`,
//! registered on a registry the caller owns.

use std::sync::Arc;
use std::time::Instant;

use prometheus::{Counter, Histogram, HistogramOpts, Opts, Registry};
use tracing::Span;

use crate::error::StoreError;

/// Every instrumented store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Transact,
    Done,
    UpsertRepos,
    UpsertSources,
    ListExternalRepoSpecs,
    SetClonedRepos,
    CountNotClonedRepos,
    CountUserAddedRepos,
    EnqueueSyncJobs,
    EnqueueSingleSyncJob,
    ListSyncJobs,
    CreateExternalServiceRepo,
    UpdateExternalServiceRepo,
    DeleteExternalServiceRepo,
    DeleteExternalServiceReposNotIn,
}

impl Operation {
    /// In declaration order, so `op as usize` indexes this array.
    pub const ALL: [Operation; 15] = [
        Operation::Transact,
        Operation::Done,
        Operation::UpsertRepos,
        Operation::UpsertSources,
        Operation::ListExternalRepoSpecs,
        Operation::SetClonedRepos,
        Operation::CountNotClonedRepos,
        Operation::CountUserAddedRepos,
        Operation::EnqueueSyncJobs,
        Operation::EnqueueSingleSyncJob,
        Operation::ListSyncJobs,
        Operation::CreateExternalServiceRepo,
        Operation::UpdateExternalServiceRepo,
        Operation::DeleteExternalServiceRepo,
        Operation::DeleteExternalServiceReposNotIn,
    ];

    /// Metric name fragment, e.g. `upsert_repos`.
    pub fn metric_name(self) -> &'static str {
        match self {
            Operation::Transact => "transact",
            Operation::Done => "done",
            Operation::UpsertRepos => "upsert_repos",
            Operation::UpsertSources => "upsert_sources",
            Operation::ListExternalRepoSpecs => "list_external_repo_specs",
            Operation::SetClonedRepos => "set_cloned_repos",
            Operation::CountNotClonedRepos => "count_not_cloned_repos",
            Operation::CountUserAddedRepos => "count_user_added_repos",
            Operation::EnqueueSyncJobs => "enqueue_sync_jobs",
            Operation::EnqueueSingleSyncJob => "enqueue_single_sync_job",
            Operation::ListSyncJobs => "list_sync_jobs",
            Operation::CreateExternalServiceRepo => "create_external_service_repo",
            Operation::UpdateExternalServiceRepo => "update_external_service_repo",
            Operation::DeleteExternalServiceRepo => "delete_external_service_repo",
            Operation::DeleteExternalServiceReposNotIn => "delete_external_service_repos_not_in",
        }
    }

    /// Key of the log line emitted when the operation ends, e.g. `store.upsert-repos`.
    pub fn log_key(self) -> String {
        format!("store.{}", self.metric_name().replace('_', "-"))
    }

    /// Name used for the tracing span, e.g. `Store.UpsertRepos`.
    pub fn family(self) -> &'static str {
        match self {
            Operation::Transact => "Store.Transact",
            Operation::Done => "Store.Done",
            Operation::UpsertRepos => "Store.UpsertRepos",
            Operation::UpsertSources => "Store.UpsertSources",
            Operation::ListExternalRepoSpecs => "Store.ListExternalRepoSpecs",
            Operation::SetClonedRepos => "Store.SetClonedRepos",
            Operation::CountNotClonedRepos => "Store.CountNotClonedRepos",
            Operation::CountUserAddedRepos => "Store.CountUserAddedRepos",
            Operation::EnqueueSyncJobs => "Store.EnqueueSyncJobs",
            Operation::EnqueueSingleSyncJob => "Store.EnqueueSingleSyncJob",
            Operation::ListSyncJobs => "Store.ListSyncJobs",
            Operation::CreateExternalServiceRepo => "Store.CreateExternalServiceRepo",
            Operation::UpdateExternalServiceRepo => "Store.UpdateExternalServiceRepo",
            Operation::DeleteExternalServiceRepo => "Store.DeleteExternalServiceRepo",
            Operation::DeleteExternalServiceReposNotIn => "Store.DeleteExternalServiceReposNotIn",
        }
    }
}

/// Count, duration and error series for one operation.
#[derive(Clone)]
pub struct OperationMetrics {
    count: Counter,
    duration: Histogram,
    errors: Counter,
}

impl OperationMetrics {
    fn register(registry: &Registry, op: Operation) -> Result<Self, prometheus::Error> {
        let name = op.metric_name();

        let count = Counter::with_opts(Opts::new(
            format!("src_repoupdater_store_{name}_total"),
            format!("Total number of items processed by the store {name} operation."),
        ))?;
        registry.register(Box::new(count.clone()))?;

        let duration = Histogram::with_opts(HistogramOpts::new(
            format!("src_repoupdater_store_{name}_duration_seconds"),
            format!("Time spent performing the store {name} operation."),
        ))?;
        registry.register(Box::new(duration.clone()))?;

        let errors = Counter::with_opts(Opts::new(
            format!("src_repoupdater_store_{name}_errors_total"),
            format!("Total number of errors when performing the store {name} operation."),
        ))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            count,
            duration,
            errors,
        })
    }

    pub fn observe(&self, secs: f64, count: f64, failed: bool) {
        self.count.inc_by(count.max(0.0));
        self.duration.observe(secs);
        if failed {
            self.errors.inc();
        }
    }

    pub fn count(&self) -> f64 {
        self.count.get()
    }

    pub fn errors(&self) -> f64 {
        self.errors.get()
    }

    pub fn observations(&self) -> u64 {
        self.duration.get_sample_count()
    }
}

/// Metrics for every store operation.
///
/// Cloning is cheap; clones share the underlying series.
#[derive(Clone)]
pub struct StoreMetrics {
    ops: Arc<[OperationMetrics]>,
}

impl StoreMetrics {
    /// Register all store series on `registry`.
    ///
    /// Fails if the registry already holds series with the same names.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ops = Operation::ALL
            .iter()
            .map(|&op| OperationMetrics::register(registry, op))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ops: ops.into() })
    }

    pub fn get(&self, op: Operation) -> &OperationMetrics {
        &self.ops[op as usize]
    }
}

/// An in-flight instrumented operation.
///
/// Created by the store when an operation starts; [`Observation::finish`]
/// records duration, count and error and logs the outcome.
pub(crate) struct Observation {
    op: Operation,
    metrics: OperationMetrics,
    span: Span,
    began: Instant,
}

impl Observation {
    pub(crate) fn start(op: Operation, metrics: &StoreMetrics, parent: Option<&Span>) -> Self {
        let span = match parent {
            Some(parent) => tracing::info_span!(
                parent: parent,
                "store",
                op = op.family(),
                count = tracing::field::Empty,
                error = tracing::field::Empty,
            ),
            None => tracing::info_span!(
                "store",
                op = op.family(),
                count = tracing::field::Empty,
                error = tracing::field::Empty,
            ),
        };
        Self {
            op,
            metrics: metrics.get(op).clone(),
            span,
            began: Instant::now(),
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn finish<T>(self, count: usize, result: &Result<T, StoreError>) {
        let secs = self.began.elapsed().as_secs_f64();
        self.metrics.observe(secs, count as f64, result.is_err());
        self.span.record("count", count);

        let _entered = self.span.enter();
        match result {
            Ok(_) => {
                tracing::debug!(op = %self.op.log_key(), count, secs, "store operation succeeded");
            }
            Err(e) => {
                self.span.record("error", tracing::field::display(e));
                tracing::error!(
                    op = %self.op.log_key(),
                    count,
                    error = %e,
                    "store operation failed"
                );
            }
        }
    }
}
