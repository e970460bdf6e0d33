//! Pipeline orchestrator: fan out one worker per attachment, join, package.
//!
//! # Overview
//!
//! [`BulkRetrieval::run`] takes an ordered, non-empty list of descriptors and
//! always drives every one of them to a terminal state before deciding the
//! outcome. Individual failures are collected, never propagated; only an
//! empty input or a failure to package the archive is returned as an error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bundler_core::{
//!     AttachmentDescriptor, BulkRetrieval, HttpFetcher, HttpFetcherConfig, PipelineOptions, RunStatus,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::new("https://dash.example.com/api/attachments")?)?;
//! let options = PipelineOptions::default().with_fetch_timeout(Duration::from_secs(60));
//! let pipeline = BulkRetrieval::new(options, Arc::new(fetcher))?;
//!
//! let descriptors = vec![
//!     AttachmentDescriptor::new("4100000012345", Some("before.jpg".into()), 0),
//!     AttachmentDescriptor::new("4100000012346", None, 1),
//! ];
//! let result = pipeline.run(descriptors).await?;
//! if result.status() == RunStatus::PartialSuccess {
//!     let retry = pipeline.run(result.failed_descriptors()).await?;
//!     println!("retry: {:?}", retry.status());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::archive::{ArchiveBuilder, DuplicateNamePolicy, FinalizedArchive, finalize_entries};
use super::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::error::{ArchiveError, BundleError, FetchError};
use super::fetcher::AttachmentFetcher;
use super::limiter::ConcurrencyLimiter;
use super::progress::{ProgressCallback, ProgressNotifier, ProgressState};
use super::worker::{FailedAttachment, WorkerContext, fetch_and_aggregate};
use crate::descriptor::AttachmentDescriptor;

/// Tuning for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    concurrency: usize,
    fetch_timeout: Option<Duration>,
    duplicate_names: DuplicateNamePolicy,
    cancel: Option<CancellationToken>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: None,
            duplicate_names: DuplicateNamePolicy::default(),
            cancel: None,
        }
    }
}

impl PipelineOptions {
    /// Maximum simultaneous fetches (1-100).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Fails any single fetch that takes longer than `timeout`.
    ///
    /// Without this the run relies on the fetcher's own timeouts.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// How colliding entry names are handled.
    #[must_use]
    pub fn with_duplicate_names(mut self, policy: DuplicateNamePolicy) -> Self {
        self.duplicate_names = policy;
        self
    }

    /// Token that, once cancelled, turns every unfinished fetch into a failure.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configured concurrency.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Configured per-fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// Configured duplicate-name policy.
    #[must_use]
    pub fn duplicate_names(&self) -> DuplicateNamePolicy {
        self.duplicate_names
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every attachment was archived.
    AllSucceeded,
    /// Some attachments were archived, some failed.
    PartialSuccess,
    /// Nothing was archived; no archive is produced.
    TotalFailure,
}

impl RunStatus {
    /// Classifies `succeeded` out of a non-zero `total`.
    #[must_use]
    pub fn classify(succeeded: usize, total: usize) -> Self {
        if succeeded == 0 {
            Self::TotalFailure
        } else if succeeded >= total {
            Self::AllSucceeded
        } else {
            Self::PartialSuccess
        }
    }
}

/// Everything a caller needs after a run.
#[derive(Debug)]
pub struct RunResult {
    status: RunStatus,
    total: usize,
    succeeded_count: usize,
    failed: Vec<FailedAttachment>,
    archive: Option<FinalizedArchive>,
}

impl RunResult {
    /// Run classification.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Number of descriptors in the run.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of attachments fetched successfully.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded_count
    }

    /// Failed attachments with reasons. Order is not significant.
    #[must_use]
    pub fn failed(&self) -> &[FailedAttachment] {
        &self.failed
    }

    /// Descriptors of failed attachments, ready to pass to another run.
    #[must_use]
    pub fn failed_descriptors(&self) -> Vec<AttachmentDescriptor> {
        self.failed.iter().map(|f| f.descriptor().clone()).collect()
    }

    /// The archive; `None` exactly when the run is a total failure.
    #[must_use]
    pub fn archive(&self) -> Option<&FinalizedArchive> {
        self.archive.as_ref()
    }

    /// Takes ownership of the archive.
    #[must_use]
    pub fn into_archive(self) -> Option<FinalizedArchive> {
        self.archive
    }
}

/// Bulk attachment retrieval pipeline.
///
/// # Concurrency Model
///
/// - Each attachment runs in its own Tokio task
/// - A run-scoped [`ConcurrencyLimiter`] admits at most `concurrency` fetches,
///   in FIFO order of request
/// - Slots are released automatically when a worker finishes (RAII)
/// - Archive compression starts only after every worker has been joined
#[derive(Clone)]
pub struct BulkRetrieval {
    fetcher: Arc<dyn AttachmentFetcher>,
    options: PipelineOptions,
}

impl std::fmt::Debug for BulkRetrieval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkRetrieval")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BulkRetrieval {
    /// Creates a pipeline over `fetcher`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidConcurrency`] if the configured
    /// concurrency is outside 1-100.
    #[instrument(level = "debug", skip(fetcher))]
    pub fn new(
        options: PipelineOptions,
        fetcher: Arc<dyn AttachmentFetcher>,
    ) -> Result<Self, BundleError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(BundleError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        Ok(Self { fetcher, options })
    }

    /// Returns the configured options.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Retrieves every descriptor and packages the successes.
    ///
    /// # Errors
    ///
    /// - [`BundleError::EmptyInput`] if `descriptors` is empty; nothing runs
    /// - [`BundleError::Finalize`] if fetched attachments could not be packaged
    ///
    /// Individual fetch failures are reported in [`RunResult::failed`].
    pub async fn run(
        &self,
        descriptors: Vec<AttachmentDescriptor>,
    ) -> Result<RunResult, BundleError> {
        self.execute(descriptors, ProgressNotifier::disabled).await
    }

    /// Like [`run`](Self::run), calling `on_progress` after every completion
    /// or failure.
    ///
    /// The callback runs on a separate task and is never awaited by workers.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with_progress(
        &self,
        descriptors: Vec<AttachmentDescriptor>,
        on_progress: ProgressCallback,
    ) -> Result<RunResult, BundleError> {
        self.execute(descriptors, move || ProgressNotifier::spawn(on_progress))
            .await
    }

    #[instrument(
        skip_all,
        fields(total = descriptors.len(), concurrency = self.options.concurrency)
    )]
    async fn execute(
        &self,
        descriptors: Vec<AttachmentDescriptor>,
        notifier: impl FnOnce() -> ProgressNotifier,
    ) -> Result<RunResult, BundleError> {
        if descriptors.is_empty() {
            return Err(BundleError::EmptyInput);
        }

        let total = descriptors.len();
        let progress = Arc::new(ProgressState::new(total));
        let archive = Arc::new(ArchiveBuilder::new(self.options.duplicate_names));
        let notifier = notifier();
        let limiter = ConcurrencyLimiter::new(self.options.concurrency);
        let gate_closer = self
            .options
            .cancel
            .clone()
            .map(|cancel| close_on_cancel(cancel, limiter.clone()));
        let ctx = WorkerContext {
            fetcher: Arc::clone(&self.fetcher),
            limiter,
            archive: Arc::clone(&archive),
            progress: Arc::clone(&progress),
            notifier: notifier.clone(),
            fetch_timeout: self.options.fetch_timeout,
            cancel: self.options.cancel.clone().unwrap_or_default(),
        };

        info!("starting bulk attachment retrieval");

        let handles: Vec<_> = descriptors
            .into_iter()
            .map(|descriptor| {
                let fallback = descriptor.clone();
                (fallback, tokio::spawn(fetch_and_aggregate(descriptor, ctx.clone())))
            })
            .collect();
        drop(ctx);

        debug!(task_count = handles.len(), "waiting for attachment workers");

        let mut failed = Vec::new();
        for (descriptor, handle) in handles {
            match handle.await {
                Ok(None) => {}
                Ok(Some(failure)) => failed.push(failure),
                Err(e) => {
                    // The worker died outside its own panic guard, so it never
                    // reached its progress update.
                    warn!(id = %descriptor.id(), error = %e, "attachment worker aborted");
                    notifier.notify(progress.record_failure(&descriptor.entry_name()));
                    let reason = FetchError::Panicked {
                        id: descriptor.id().to_string(),
                    };
                    failed.push(FailedAttachment::new(descriptor, reason));
                }
            }
        }
        drop(notifier);
        if let Some(closer) = gate_closer {
            closer.abort();
        }

        let succeeded_count = total - failed.len();
        let status = RunStatus::classify(succeeded_count, total);
        let snapshot = progress.snapshot();
        debug_assert_eq!(snapshot.finished(), total);
        debug_assert_eq!(snapshot.completed, succeeded_count);

        let archive = if succeeded_count > 0 {
            let entries = archive.take_entries();
            let finalized = tokio::task::spawn_blocking(move || finalize_entries(entries))
                .await
                .map_err(|source| ArchiveError::Task { source })??;
            Some(finalized)
        } else {
            None
        };

        info!(
            ?status,
            succeeded = succeeded_count,
            failed = failed.len(),
            total,
            archive_bytes = archive.as_ref().map_or(0, |a| a.bytes().len()),
            "bulk attachment retrieval complete"
        );

        Ok(RunResult {
            status,
            total,
            succeeded_count,
            failed,
            archive,
        })
    }
}

/// Closes the run's limiter once `cancel` fires, failing every worker still
/// waiting for admission.
fn close_on_cancel(
    cancel: CancellationToken,
    limiter: ConcurrencyLimiter,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cancel.cancelled().await;
        debug!(active = limiter.active(), "run cancelled; closing admission gate");
        limiter.close();
    })
}
