//! Attachment Bundler Core Library
//!
//! This library bulk-downloads service appointment attachments through an
//! external file proxy and packages them into a single zip archive, reporting
//! exactly which attachments could not be retrieved.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`descriptor`] - Attachment descriptors and input parsing
//! - [`bundle`] - Bounded-concurrency fetch pipeline and archive finalization
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bundler_core::{AttachmentDescriptor, BulkRetrieval, HttpFetcher, HttpFetcherConfig, PipelineOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(HttpFetcherConfig::new("https://dashboard.example.com/api/attachments")?)?;
//! let pipeline = BulkRetrieval::new(PipelineOptions::default(), Arc::new(fetcher))?;
//! let descriptors = vec![AttachmentDescriptor::new("4100000012345", Some("site-photo.jpg".into()), 0)];
//! let result = pipeline.run(descriptors).await?;
//! println!("{:?}: {} archived", result.status(), result.succeeded_count());
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bundle;
pub mod descriptor;

// Re-export commonly used types
pub use bundle::{
    ArchiveError, ArchiveSummary, AttachmentFetcher, BulkRetrieval, BundleError,
    ConcurrencyLimiter, DEFAULT_CONCURRENCY, DuplicateNamePolicy, EntrySummary,
    FailedAttachment, FetchError, FetchOutcome, FinalizedArchive, HttpFetcher,
    HttpFetcherConfig, PipelineOptions, ProgressCallback, ProgressSnapshot, RunManifest,
    RunResult, RunStatus,
};
pub use descriptor::{AttachmentDescriptor, DescriptorError, parse_descriptors};
