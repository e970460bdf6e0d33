//! JSON summary of a finished run.

use serde::Serialize;

use super::archive::EntrySummary;
use super::pipeline::{RunResult, RunStatus};

/// One failed attachment in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Attachment identifier.
    pub id: String,
    /// Name the entry would have had.
    pub name: String,
    /// Position in the input list.
    pub sequence_index: usize,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Serializable record of what a run archived and what it missed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunManifest {
    /// Run classification.
    pub status: RunStatus,
    /// Descriptors in the run.
    pub total: usize,
    /// Attachments fetched successfully.
    pub succeeded: usize,
    /// Archived entries with sizes and digests.
    pub entries: Vec<EntrySummary>,
    /// Failed attachments, ordered by input position.
    pub failures: Vec<FailureRecord>,
}

impl RunManifest {
    /// Builds the manifest for `result`.
    #[must_use]
    pub fn from_result(result: &RunResult) -> Self {
        let entries = result
            .archive()
            .map(|archive| archive.summary().entries.clone())
            .unwrap_or_default();

        let mut failures: Vec<FailureRecord> = result
            .failed()
            .iter()
            .map(|failed| FailureRecord {
                id: failed.descriptor().id().to_string(),
                name: failed.descriptor().entry_name(),
                sequence_index: failed.descriptor().sequence_index(),
                reason: failed.reason().to_string(),
            })
            .collect();
        failures.sort_by_key(|f| f.sequence_index);

        Self {
            status: result.status(),
            total: result.total(),
            succeeded: result.succeeded_count(),
            entries,
            failures,
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors (not expected for this type).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
