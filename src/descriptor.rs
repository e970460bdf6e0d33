//! Attachment descriptors and input parsing.
//!
//! A descriptor names one attachment held by the field-service system: its
//! opaque identifier, an optional display name used as the archive entry name,
//! and its position in the caller's list (used to synthesize a name when the
//! display name is missing).
//!
//! # Input format
//!
//! [`parse_descriptors`] accepts either a bare JSON array or the `{"data": [...]}`
//! envelope returned by the attachments listing API:
//!
//! ```
//! use bundler_core::parse_descriptors;
//!
//! let descriptors = parse_descriptors(r#"{"data": [
//!     {"id": "4100000012345", "file_name": "before.jpg"},
//!     {"id": 4100000012346}
//! ]}"#).unwrap();
//!
//! assert_eq!(descriptors.len(), 2);
//! assert_eq!(descriptors[0].entry_name(), "before.jpg");
//! assert_eq!(descriptors[1].entry_name(), "attachment-2");
//! ```

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// One attachment to retrieve.
///
/// Descriptors are immutable once built; the pipeline clones them into
/// failure records so callers can re-run exactly the failed subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttachmentDescriptor {
    id: String,
    display_name: Option<String>,
    sequence_index: usize,
}

impl AttachmentDescriptor {
    /// Creates a descriptor.
    ///
    /// `sequence_index` is zero-based; the synthesized entry name is
    /// `attachment-{sequence_index + 1}`.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: Option<String>, sequence_index: usize) -> Self {
        Self {
            id: id.into(),
            display_name,
            sequence_index,
        }
    }

    /// Opaque attachment identifier passed to the fetch boundary.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name as supplied, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Zero-based position in the original input list.
    #[must_use]
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Name used for the archive entry and for progress display.
    ///
    /// Uses the display name when present and non-blank (sanitized so it
    /// cannot escape the archive root), otherwise `attachment-{index+1}`.
    #[must_use]
    pub fn entry_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_entry_name(name),
            _ => self.synthesized_name(),
        }
    }

    fn synthesized_name(&self) -> String {
        format!("attachment-{}", self.sequence_index + 1)
    }
}

/// Errors raised while parsing descriptor input.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Input was not valid JSON or did not match either accepted shape.
    #[error("invalid attachment list: {source}")]
    Json {
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An attachment object had an empty or non-scalar `id`.
    #[error("attachment at position {position} has an invalid id: {reason}")]
    InvalidId {
        /// Zero-based position of the offending object.
        position: usize,
        /// What was wrong with the id.
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    id: serde_json::Value,
    #[serde(default, alias = "display_name", alias = "file_name", alias = "File_Name")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAttachmentList {
    List(Vec<RawAttachment>),
    Envelope { data: Vec<RawAttachment> },
}

/// Parses a JSON attachment list into descriptors, assigning sequence indexes
/// by position.
///
/// An empty list parses successfully; rejecting empty input is the pipeline's
/// job so that the usage error is reported in one place.
///
/// # Errors
///
/// Returns [`DescriptorError::Json`] for malformed input and
/// [`DescriptorError::InvalidId`] for blank, null, structured, `.` or `..`
/// ids. String ids are otherwise kept exactly as given.
#[instrument(level = "debug", skip(input), fields(input_len = input.len()))]
pub fn parse_descriptors(input: &str) -> Result<Vec<AttachmentDescriptor>, DescriptorError> {
    let raw: RawAttachmentList =
        serde_json::from_str(input).map_err(|source| DescriptorError::Json { source })?;
    let items = match raw {
        RawAttachmentList::List(items) | RawAttachmentList::Envelope { data: items } => items,
    };

    let descriptors = items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let id = scalar_id(&item.id).map_err(|reason| DescriptorError::InvalidId {
                position,
                reason: reason.to_string(),
            })?;
            Ok(AttachmentDescriptor::new(id, item.name, position))
        })
        .collect::<Result<Vec<_>, DescriptorError>>()?;

    debug!(count = descriptors.len(), "parsed attachment descriptors");
    Ok(descriptors)
}

fn scalar_id(value: &serde_json::Value) -> Result<String, &'static str> {
    match value {
        serde_json::Value::String(s) if s.trim().is_empty() => Err("id is blank"),
        serde_json::Value::String(s) if s == "." || s == ".." => {
            Err("id is a relative path segment")
        }
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Err("id is null"),
        _ => Err("id must be a string or number"),
    }
}

/// Makes a display name safe to use as a flat archive entry name.
///
/// Replaces characters that are path separators or invalid on common
/// filesystems: / \ : * ? " < > |
pub(crate) fn sanitize_entry_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_safe_entry_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_entry_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
