//! Bulk attachment retrieval pipeline.
//!
//! This module fetches a list of attachments with bounded concurrency and
//! packages the ones that arrived into a single zip archive.
//!
//! # Features
//!
//! - FIFO-fair concurrency limit (default 6 simultaneous fetches)
//! - Per-attachment failure isolation; one bad file never aborts the run
//! - Three-way outcome: all succeeded, partial success, total failure
//! - Non-blocking progress notifications for UI feedback
//! - Optional per-fetch timeout and run cancellation
//! - Zip finalization on the blocking pool after all fetches complete
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bundler_core::bundle::{BulkRetrieval, HttpFetcher, HttpFetcherConfig, PipelineOptions, ProgressSnapshot};
//! use bundler_core::parse_descriptors;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptors = parse_descriptors(&std::fs::read_to_string("attachments.json")?)?;
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::new("https://dash.example.com/api/attachments")?)?;
//! let pipeline = BulkRetrieval::new(PipelineOptions::default(), Arc::new(fetcher))?;
//!
//! let result = pipeline
//!     .run_with_progress(descriptors, Arc::new(|snap: ProgressSnapshot| {
//!         println!("{}/{}", snap.finished(), snap.total);
//!     }))
//!     .await?;
//! if let Some(archive) = result.archive() {
//!     std::fs::write("attachments.zip", archive.bytes())?;
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod constants;
mod error;
mod fetcher;
pub mod limiter;
mod manifest;
mod pipeline;
mod progress;
mod worker;

pub use archive::{
    ArchiveBuilder, ArchiveSummary, DuplicateNamePolicy, EntrySummary, FinalizedArchive,
    finalize_entries,
};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTACHMENT_BYTES, IN_FLIGHT_WINDOW,
    READ_TIMEOUT_SECS,
};
pub use error::{ArchiveError, BundleError, FetchError};
pub use fetcher::{AttachmentFetcher, HttpFetcher, HttpFetcherConfig};
pub use limiter::{ConcurrencyLimiter, LimiterClosed, LimiterPermit};
pub use manifest::{FailureRecord, RunManifest};
pub use pipeline::{BulkRetrieval, PipelineOptions, RunResult, RunStatus};
pub use progress::{ProgressCallback, ProgressSnapshot, ProgressState};
pub use worker::{FailedAttachment, FetchOutcome};
