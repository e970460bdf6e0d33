//! Constants for the bundle module (concurrency, timeouts, limits).

/// Default number of attachments fetched at the same time.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Minimum allowed concurrency value.
pub(crate) const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub(crate) const MAX_CONCURRENCY: usize = 100;

/// Number of in-flight display names kept for progress display.
pub const IN_FLIGHT_WINDOW: usize = 5;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large attachments).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default cap on a single attachment body (100 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;
