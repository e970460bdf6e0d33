//! Per-attachment fetch-and-aggregate unit of work.
//!
//! One worker runs per descriptor. It waits for a limiter slot, fetches the
//! bytes, and either stores them in the shared archive or records the
//! failure. Progress is updated exactly once per worker, and the slot is
//! released on every path because it lives in a scoped [`LimiterPermit`].
//!
//! Errors are converted to data here; nothing a fetch does can abort the run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::archive::ArchiveBuilder;
use super::error::FetchError;
use super::fetcher::AttachmentFetcher;
use super::limiter::{ConcurrencyLimiter, LimiterPermit};
use super::progress::{ProgressNotifier, ProgressState};
use crate::descriptor::AttachmentDescriptor;

/// Result of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Bytes were retrieved.
    Success {
        /// Attachment contents.
        bytes: Vec<u8>,
    },
    /// The attachment could not be retrieved.
    Failure {
        /// The descriptor that failed.
        descriptor: AttachmentDescriptor,
        /// Why it failed.
        reason: FetchError,
    },
}

/// A descriptor that could not be retrieved, with the reason.
#[derive(Debug)]
pub struct FailedAttachment {
    descriptor: AttachmentDescriptor,
    reason: FetchError,
}

impl FailedAttachment {
    pub(crate) fn new(descriptor: AttachmentDescriptor, reason: FetchError) -> Self {
        Self { descriptor, reason }
    }

    /// The descriptor, suitable for a retry run.
    #[must_use]
    pub fn descriptor(&self) -> &AttachmentDescriptor {
        &self.descriptor
    }

    /// Why the fetch failed.
    #[must_use]
    pub fn reason(&self) -> &FetchError {
        &self.reason
    }
}

/// Shared handles every worker of a run receives.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) fetcher: Arc<dyn AttachmentFetcher>,
    pub(crate) limiter: ConcurrencyLimiter,
    pub(crate) archive: Arc<ArchiveBuilder>,
    pub(crate) progress: Arc<ProgressState>,
    pub(crate) notifier: ProgressNotifier,
    pub(crate) fetch_timeout: Option<Duration>,
    pub(crate) cancel: CancellationToken,
}

/// Runs one attachment to a terminal state.
///
/// Returns `None` on success (the bytes are already in the archive) or the
/// failure record otherwise.
#[instrument(
    skip(ctx, descriptor),
    fields(id = %descriptor.id(), index = descriptor.sequence_index())
)]
pub(crate) async fn fetch_and_aggregate(
    descriptor: AttachmentDescriptor,
    ctx: WorkerContext,
) -> Option<FailedAttachment> {
    let name = descriptor.entry_name();

    let permit = match admit(&descriptor, &ctx).await {
        Ok(permit) => permit,
        Err(reason) => return Some(finish_failed(&ctx, &name, descriptor, reason)),
    };

    ctx.progress.mark_started(&name);
    let outcome = fetch_attachment(descriptor, &ctx).await;

    let failed = match outcome {
        FetchOutcome::Success { bytes } => {
            let size = bytes.len();
            let stored = ctx.archive.insert(&name, bytes);
            ctx.notifier.notify(ctx.progress.record_success(&name));
            debug!(entry = %stored, bytes = size, "attachment archived");
            None
        }
        FetchOutcome::Failure { descriptor, reason } => {
            Some(finish_failed(&ctx, &name, descriptor, reason))
        }
    };

    drop(permit);
    failed
}

/// Waits for a slot.
///
/// The orchestrator closes the limiter when the run is cancelled, so a closed
/// gate means this attachment was cancelled before it was admitted.
async fn admit(
    descriptor: &AttachmentDescriptor,
    ctx: &WorkerContext,
) -> Result<LimiterPermit, FetchError> {
    if ctx.cancel.is_cancelled() {
        return Err(FetchError::cancelled(descriptor.id()));
    }
    ctx.limiter
        .acquire()
        .await
        .map_err(|_| FetchError::cancelled(descriptor.id()))
}

/// Calls the fetch boundary with timeout, cancellation, and panic capture.
async fn fetch_attachment(descriptor: AttachmentDescriptor, ctx: &WorkerContext) -> FetchOutcome {
    let id = descriptor.id();
    let fetch = AssertUnwindSafe(ctx.fetcher.fetch(id)).catch_unwind();

    let guarded = async {
        match ctx.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Ok(Err(FetchError::timeout(id))),
            },
            None => fetch.await,
        }
    };

    let result = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(FetchError::cancelled(id)),
        caught = guarded => caught.unwrap_or_else(|_| {
            Err(FetchError::Panicked { id: id.to_string() })
        }),
    };

    match result {
        Ok(bytes) => FetchOutcome::Success { bytes },
        Err(reason) => FetchOutcome::Failure { descriptor, reason },
    }
}

fn finish_failed(
    ctx: &WorkerContext,
    name: &str,
    descriptor: AttachmentDescriptor,
    reason: FetchError,
) -> FailedAttachment {
    warn!(
        id = %descriptor.id(),
        entry = name,
        error = %reason,
        "attachment fetch failed"
    );
    ctx.notifier.notify(ctx.progress.record_failure(name));
    FailedAttachment::new(descriptor, reason)
}
